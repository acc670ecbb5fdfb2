//! Collaborator interfaces consumed by the save engine.

use restsync_core::Result;
use restsync_core::metadata::ResourceMetadata;
use serde_json::Value;

/// A remote or local resource addressed by its logical path.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub logical_path: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListPolicy {
    pub recursive: bool,
}

/// Reads from the remote server. Transport, retries and auth live behind it.
pub trait Orchestrator {
    fn get_remote(&mut self, logical_path: &str) -> Result<Value>;

    fn list_remote(&mut self, logical_path: &str, policy: ListPolicy) -> Result<Vec<Resource>>;
}

pub trait MetadataService {
    /// Effective metadata for a path, after inheritance. `NotFound` when
    /// nothing applies.
    fn resolve_for_path(&mut self, logical_path: &str) -> Result<ResourceMetadata>;

    /// Metadata stored exactly at `path`, which may be a `_` template.
    fn get(&mut self, path: &str) -> Result<ResourceMetadata>;

    fn set(&mut self, path: &str, metadata: ResourceMetadata) -> Result<()>;

    fn collection_children(&mut self) -> Option<&mut dyn CollectionChildrenResolver> {
        None
    }

    fn collection_wildcard(&mut self) -> Option<&mut dyn CollectionWildcardResolver> {
        None
    }
}

/// Optional capability: child segment names declared below a collection.
pub trait CollectionChildrenResolver {
    fn resolve_collection_children(&mut self, logical_path: &str) -> Result<Vec<String>>;
}

/// Optional capability: whether a `_` child template exists below a path.
pub trait CollectionWildcardResolver {
    fn has_collection_wildcard_child(&mut self, logical_path: &str) -> Result<bool>;
}

pub trait SecretProvider {
    /// Attribute names or dotted paths that look like plaintext secrets.
    fn detect_secret_candidates(&mut self, value: &Value) -> Result<Vec<String>>;

    fn store(&mut self, key: &str, value: &str) -> Result<()>;
}

/// The local repository of resource files.
pub trait ResourceStore {
    fn get(&mut self, logical_path: &str) -> Result<Value>;

    fn save(&mut self, logical_path: &str, value: &Value) -> Result<()>;
}

#[cfg(feature = "fs")]
pub mod fs;
#[cfg(feature = "http")]
pub mod http;
