mod error;

pub mod attributes;
pub mod cancel;
pub mod config;
pub mod metadata;
pub mod path;
pub mod secrets;

pub use error::{Error, Result};
