#![forbid(unsafe_code)]

//! `restsync` saves resources read from a REST server into a local repository.
//!
//! - `save`: the save engine (path expansion, list handling, secret safety)
//! - `store`: collaborator traits + filesystem/HTTP implementations

pub mod save;
pub mod store;

pub use restsync_core::{Error, Result};
