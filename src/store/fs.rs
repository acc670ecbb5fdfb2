//! Directory-backed repository, metadata tree and secret file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use restsync_core::metadata::ResourceMetadata;
use restsync_core::path::{
    WILDCARD_SEGMENT, normalize_logical_path, normalize_save_path_pattern, split_segments,
};
use restsync_core::{Error, Result};
use serde_json::Value;

use super::{
    CollectionChildrenResolver, CollectionWildcardResolver, MetadataService, ResourceStore,
    SecretProvider,
};

const RESOURCE_FILE: &str = "resource.json";
const METADATA_FILE: &str = "metadata.json";

fn dir_for(root: &Path, path: &str) -> PathBuf {
    let mut dir = root.to_path_buf();
    for segment in split_segments(path) {
        dir.push(segment);
    }
    dir
}

fn write_json_file(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut body = serde_json::to_vec_pretty(value)
        .map_err(|err| Error::Internal(format!("serialize {path:?}: {err}")))?;
    body.push(b'\n');
    fs::write(path, body)?;
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("{what} not found: {path:?}")));
        }
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&raw)
        .map_err(|err| Error::Validation(format!("invalid json in {path:?}: {err}")))
}

/// Stores each resource at `<root>/<logical path>/resource.json`.
pub struct FsResourceStore {
    root: PathBuf,
}

impl FsResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_for(&self, logical_path: &str) -> Result<PathBuf> {
        let path = normalize_logical_path(logical_path)?;
        Ok(dir_for(&self.root, &path).join(RESOURCE_FILE))
    }
}

impl ResourceStore for FsResourceStore {
    fn get(&mut self, logical_path: &str) -> Result<Value> {
        let file = self.file_for(logical_path)?;
        read_json_file(&file, "resource")
    }

    fn save(&mut self, logical_path: &str, value: &Value) -> Result<()> {
        let file = self.file_for(logical_path)?;
        write_json_file(&file, value)
    }
}

/// Metadata tree at `<root>/<path>/metadata.json`, where `_` directories are
/// templates matching any segment.
pub struct FsMetadataService {
    root: PathBuf,
}

impl FsMetadataService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Every directory matching `logical_path`, where a `_` directory stands
    /// in for any segment. Literal branches come before template branches at
    /// each level, so the first match is the most specific one.
    fn matching_dirs(&self, logical_path: &str) -> Result<Vec<PathBuf>> {
        let path = normalize_logical_path(logical_path)?;
        let mut frontier = vec![self.root.clone()];
        for segment in split_segments(&path) {
            let mut next = Vec::new();
            for dir in &frontier {
                let literal = dir.join(segment);
                if literal.is_dir() {
                    next.push(literal);
                }
                let template = dir.join(WILDCARD_SEGMENT);
                if template.is_dir() {
                    next.push(template);
                }
            }
            if next.is_empty() {
                return Ok(Vec::new());
            }
            frontier = next;
        }
        Ok(frontier)
    }

    fn file_for(&self, path: &str) -> Result<PathBuf> {
        let pattern = normalize_save_path_pattern(path)?;
        Ok(dir_for(&self.root, &pattern.path).join(METADATA_FILE))
    }
}

impl MetadataService for FsMetadataService {
    fn resolve_for_path(&mut self, logical_path: &str) -> Result<ResourceMetadata> {
        for dir in self.matching_dirs(logical_path)? {
            let file = dir.join(METADATA_FILE);
            if file.is_file() {
                return read_json_file(&file, "metadata");
            }
        }
        Err(Error::NotFound(format!(
            "no metadata applies to {logical_path:?}"
        )))
    }

    fn get(&mut self, path: &str) -> Result<ResourceMetadata> {
        let file = self.file_for(path)?;
        read_json_file(&file, "metadata")
    }

    fn set(&mut self, path: &str, metadata: ResourceMetadata) -> Result<()> {
        let file = self.file_for(path)?;
        write_json_file(&file, &metadata)
    }

    fn collection_children(&mut self) -> Option<&mut dyn CollectionChildrenResolver> {
        Some(self)
    }

    fn collection_wildcard(&mut self) -> Option<&mut dyn CollectionWildcardResolver> {
        Some(self)
    }
}

impl CollectionChildrenResolver for FsMetadataService {
    fn resolve_collection_children(&mut self, logical_path: &str) -> Result<Vec<String>> {
        let mut children = BTreeSet::new();
        for dir in self.matching_dirs(logical_path)? {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str()
                    && name != WILDCARD_SEGMENT
                {
                    children.insert(name.to_string());
                }
            }
        }
        Ok(children.into_iter().collect())
    }
}

impl CollectionWildcardResolver for FsMetadataService {
    fn has_collection_wildcard_child(&mut self, logical_path: &str) -> Result<bool> {
        Ok(self
            .matching_dirs(logical_path)?
            .iter()
            .any(|dir| dir.join(WILDCARD_SEGMENT).is_dir()))
    }
}

/// Secrets kept as one JSON object of key to value.
///
/// Writes take an exclusive lock on the file for the read-modify-write.
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let secrets: BTreeMap<String, String> = match read_json_file(&self.path, "secret store") {
            Ok(secrets) => secrets,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(secrets.get(key).cloned())
    }
}

impl SecretProvider for FileSecretStore {
    fn detect_secret_candidates(&mut self, value: &Value) -> Result<Vec<String>> {
        Ok(restsync_core::secrets::detect_secret_candidates(value))
    }

    fn store(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        let mut secrets: BTreeMap<String, String> = if raw.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&raw).map_err(|err| {
                Error::Validation(format!("invalid json in {:?}: {err}", self.path))
            })?
        };
        secrets.insert(key.to_string(), value.to_string());

        let mut body = serde_json::to_vec_pretty(&secrets)
            .map_err(|err| Error::Internal(format!("serialize secret store: {err}")))?;
        body.push(b'\n');
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&body)?;
        file.sync_all()?;
        tracing::debug!(key = %key, "stored secret");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resource_store_maps_paths_to_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsResourceStore::new(dir.path());

        assert!(store.get("/customers/acme").unwrap_err().is_not_found());
        store.save("/customers/acme", &json!({"id": "acme"})).unwrap();
        assert!(dir.path().join("customers/acme/resource.json").is_file());
        assert_eq!(store.get("/customers/acme/").unwrap(), json!({"id": "acme"}));
        assert!(store.get("/customers/../etc").is_err());
    }

    #[test]
    fn metadata_resolution_prefers_literal_over_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut md = FsMetadataService::new(dir.path());
        md.set(
            "/admin/realms/_/clients",
            ResourceMetadata {
                alias_from_attribute: Some("clientId".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        md.set(
            "/admin/realms/master/clients",
            ResourceMetadata {
                id_from_attribute: Some("id".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let resolved = md.resolve_for_path("/admin/realms/other/clients").unwrap();
        assert_eq!(resolved.alias_attribute(), Some("clientId"));
        let resolved = md.resolve_for_path("/admin/realms/master/clients").unwrap();
        assert_eq!(resolved.id_attribute(), Some("id"));
        assert!(md.resolve_for_path("/unknown").unwrap_err().is_not_found());
    }

    #[test]
    fn metadata_resolution_falls_back_to_template_when_literal_branch_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let mut md = FsMetadataService::new(dir.path());
        md.set(
            "/admin/realms/_/clients",
            ResourceMetadata {
                alias_from_attribute: Some("clientId".to_string()),
                secrets_from_attributes: vec!["secret".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
        md.set("/admin/realms/master/clients/app1", ResourceMetadata::default())
            .unwrap();

        let resolved = md.resolve_for_path("/admin/realms/master/clients").unwrap();
        assert_eq!(resolved.alias_attribute(), Some("clientId"));
        assert_eq!(resolved.declared_secrets(), vec!["secret"]);
        assert_eq!(
            md.resolve_for_path("/admin/realms/master/clients/app1").unwrap(),
            ResourceMetadata::default()
        );
        assert!(
            md.resolve_for_path("/admin/realms/master/users")
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(
            md.resolve_collection_children("/admin/realms/master/clients").unwrap(),
            vec!["app1"]
        );
    }

    #[test]
    fn metadata_capabilities_read_the_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut md = FsMetadataService::new(dir.path());
        md.set("/admin/realms/_/clients", ResourceMetadata::default())
            .unwrap();
        md.set("/admin/realms/_/users", ResourceMetadata::default())
            .unwrap();
        md.set("/admin/config", ResourceMetadata::default()).unwrap();

        assert_eq!(
            md.resolve_collection_children("/admin/realms/master").unwrap(),
            vec!["clients", "users"]
        );
        assert!(md.has_collection_wildcard_child("/admin/realms").unwrap());
        assert!(!md.has_collection_wildcard_child("/admin").unwrap());
        assert!(md.resolve_collection_children("/nowhere").unwrap().is_empty());
    }

    #[test]
    fn secret_store_merges_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut secrets = FileSecretStore::new(dir.path().join("nested/secrets.json"));

        assert_eq!(secrets.get("/a:password").unwrap(), None);
        secrets.store("/a:password", "s3cret").unwrap();
        secrets.store("/b:token", "t0ken").unwrap();
        secrets.store("/a:password", "rotated").unwrap();

        assert_eq!(secrets.get("/a:password").unwrap().as_deref(), Some("rotated"));
        assert_eq!(secrets.get("/b:token").unwrap().as_deref(), Some("t0ken"));
    }
}
