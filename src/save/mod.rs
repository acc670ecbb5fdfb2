mod entries;
mod fallback;
mod guard;
mod identity;
mod remote;
mod secrets;
mod wildcard;

use restsync_core::cancel::CancelToken;
use restsync_core::config::SaveRules;
use restsync_core::metadata::ResourceMetadata;
use restsync_core::path::normalize_save_path_pattern;
use restsync_core::{Error, Result};
use serde_json::Value;

use crate::store::{
    ListPolicy, MetadataService, Orchestrator, Resource, ResourceStore, SecretProvider,
};

pub use entries::{PayloadShape, SaveEntry, classify_payload};
pub use fallback::should_use_metadata_collection_fallback;
pub use identity::{fallback_alias, resolve_list_item_alias};
pub use secrets::{
    blocking_attributes, collection_metadata_path, filter_for_safety, safety_error,
};

#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Treat the payload as a list of resources.
    pub as_items: bool,
    /// Treat the payload as one resource even if it looks like a list.
    pub as_one_resource: bool,
    /// Save plaintext-looking secrets as they are.
    pub ignore: bool,
    /// Overwrite resources that already exist in the repository.
    pub force: bool,
    pub handle_secrets: bool,
    /// Attributes to handle; empty handles every detected candidate.
    pub requested_secrets: Vec<String>,
}

/// Logical paths written by one save, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<String>,
}

/// Saves remote or supplied payloads into the local repository.
///
/// One engine is built per invocation around borrowed collaborators.
pub struct SaveEngine<'a> {
    orchestrator: &'a mut dyn Orchestrator,
    store: &'a mut dyn ResourceStore,
    metadata: Option<&'a mut dyn MetadataService>,
    secrets: Option<&'a mut dyn SecretProvider>,
    rules: SaveRules,
    cancel: CancelToken,
}

impl<'a> SaveEngine<'a> {
    pub fn new(orchestrator: &'a mut dyn Orchestrator, store: &'a mut dyn ResourceStore) -> Self {
        Self {
            orchestrator,
            store,
            metadata: None,
            secrets: None,
            rules: SaveRules::default(),
            cancel: CancelToken::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: &'a mut dyn MetadataService) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_secrets(mut self, secrets: &'a mut dyn SecretProvider) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_rules(mut self, rules: SaveRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Saves `path`, pulling from the remote server when `input` is `None`.
    pub fn execute(
        &mut self,
        path: &str,
        input: Option<Value>,
        options: &SaveOptions,
    ) -> Result<SaveReport> {
        let pattern = normalize_save_path_pattern(path)?;
        if options.as_items && options.as_one_resource {
            return Err(Error::Validation(
                "flags --as-items and --as-one-resource cannot be used together".to_string(),
            ));
        }

        let mut report = SaveReport::default();

        if pattern.has_wildcard {
            if input.is_some() {
                return Err(Error::Validation(
                    "wildcard save paths are supported only when reading from remote server"
                        .to_string(),
                ));
            }
            let targets = self.expand_wildcard_paths(&pattern.path)?;
            let mut matched = 0usize;
            for target in targets {
                let value = match self.remote_get(&target) {
                    Ok(value) => value,
                    Err(err) if err.is_not_found() => {
                        tracing::warn!(path = %target, "wildcard target vanished from remote; skipping");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                matched += 1;
                self.save_payload(&target, value, options, &mut report)?;
            }
            if matched == 0 {
                return Err(Error::NotFound(format!(
                    "no remote resources matched wildcard path {:?}",
                    pattern.path
                )));
            }
            return Ok(report);
        }

        let value = match input {
            Some(value) => value,
            None => self.resolve_remote_value(&pattern.path, pattern.explicit_collection_target)?,
        };
        self.save_payload(&pattern.path, value, options, &mut report)?;
        Ok(report)
    }

    fn save_payload(
        &mut self,
        path: &str,
        value: Value,
        options: &SaveOptions,
        report: &mut SaveReport,
    ) -> Result<()> {
        if options.as_one_resource {
            return self.save_single(path, value, options, report);
        }
        match classify_payload(value)? {
            PayloadShape::List(items) => self.save_list(path, items, options, report),
            PayloadShape::Single(_) if options.as_items => Err(Error::Validation(
                "input payload is not a list; use --as-one-resource to save a single resource"
                    .to_string(),
            )),
            PayloadShape::Single(value) => self.save_single(path, value, options, report),
        }
    }

    fn save_single(
        &mut self,
        path: &str,
        value: Value,
        options: &SaveOptions,
        report: &mut SaveReport,
    ) -> Result<()> {
        self.ensure_target_allowed(path, options.force)?;

        let value = if options.handle_secrets {
            let (value, unhandled, unmasked) =
                self.explicit_handle(path, value, &options.requested_secrets)?;
            let declared = self.declared_secrets(path)?;
            let blocking = blocking_attributes(&unhandled, &declared, &unmasked, options.ignore);
            if !blocking.is_empty() {
                return Err(safety_error(path, &blocking));
            }
            value
        } else {
            let (value, unmasked) = self.auto_handle_declared(path, value)?;
            self.enforce_safety(path, &value, &unmasked, options.ignore)?;
            value
        };

        self.store_save(path, &value)?;
        report.saved.push(path.to_string());
        Ok(())
    }

    fn save_list(
        &mut self,
        collection_path: &str,
        items: Vec<Value>,
        options: &SaveOptions,
        report: &mut SaveReport,
    ) -> Result<()> {
        let entries = self.resolve_entries(collection_path, items)?;
        self.ensure_entries_writable(&entries, options.force)?;

        let candidates = self.detect_candidates_for_collection(collection_path, &entries)?;
        let entries = if options.handle_secrets {
            let (selected, unhandled) =
                secrets::select_candidates(&candidates, &options.requested_secrets, true)?;
            let (entries, unmasked) = if selected.is_empty() {
                (entries, Vec::new())
            } else {
                let (entries, unmasked) = self.apply_to_entries(entries, &selected)?;
                let metadata_path = collection_metadata_path(collection_path, &self.rules);
                self.persist_secret_attributes(&metadata_path, &selected)?;
                (entries, unmasked)
            };
            let declared = self.declared_secrets(collection_path)?;
            let blocking = blocking_attributes(&unhandled, &declared, &unmasked, options.ignore);
            if !blocking.is_empty() {
                return Err(safety_error(collection_path, &blocking));
            }
            entries
        } else {
            let declared = self.declared_secrets(collection_path)?;
            let (entries, unmasked) = self.auto_handle_entries(entries, &candidates, &declared)?;
            let blocking = blocking_attributes(&candidates, &declared, &unmasked, options.ignore);
            if !blocking.is_empty() {
                return Err(safety_error(collection_path, &blocking));
            }
            entries
        };

        tracing::debug!(collection = %collection_path, entries = entries.len(), "saving list entries");
        for entry in entries {
            self.store_save(&entry.logical_path, &entry.payload)?;
            report.saved.push(entry.logical_path);
        }
        Ok(())
    }

    fn remote_get(&mut self, path: &str) -> Result<Value> {
        self.cancel.check()?;
        self.orchestrator.get_remote(path)
    }

    fn remote_list(&mut self, path: &str, policy: ListPolicy) -> Result<Vec<Resource>> {
        self.cancel.check()?;
        self.orchestrator.list_remote(path, policy)
    }

    fn store_get(&mut self, path: &str) -> Result<Value> {
        self.cancel.check()?;
        self.store.get(path)
    }

    fn store_save(&mut self, path: &str, value: &Value) -> Result<()> {
        self.cancel.check()?;
        self.store.save(path, value)?;
        tracing::info!(path = %path, "saved resource");
        Ok(())
    }

    /// Effective metadata for `path`; nothing declared when the service is
    /// absent or has no entry.
    fn resolve_metadata(&mut self, path: &str) -> Result<ResourceMetadata> {
        self.cancel.check()?;
        let Some(metadata) = self.metadata.as_deref_mut() else {
            return Ok(ResourceMetadata::default());
        };
        match metadata.resolve_for_path(path) {
            Ok(md) => Ok(md),
            Err(err) if err.is_not_found() => Ok(ResourceMetadata::default()),
            Err(err) => Err(err),
        }
    }

    fn require_metadata(&mut self) -> Result<&mut (dyn MetadataService + 'a)> {
        self.cancel.check()?;
        self.metadata
            .as_deref_mut()
            .ok_or_else(|| Error::Validation("metadata service is not configured".to_string()))
    }

    fn require_secrets(&mut self) -> Result<&mut (dyn SecretProvider + 'a)> {
        self.cancel.check()?;
        self.secrets
            .as_deref_mut()
            .ok_or_else(|| Error::Validation("secret provider is not configured".to_string()))
    }
}
