use restsync_core::{Error, Result};
use serde_json::Value;

use super::SaveEngine;
use super::fallback::should_use_metadata_collection_fallback;
use crate::store::{ListPolicy, Resource};

impl SaveEngine<'_> {
    /// Reads `path` from the remote server, reinterpreting a `NotFound` single
    /// read as a collection when the listing and metadata support it.
    pub(super) fn resolve_remote_value(
        &mut self,
        path: &str,
        explicit_collection_target: bool,
    ) -> Result<Value> {
        if explicit_collection_target {
            match self.remote_list(path, ListPolicy::default()) {
                Ok(items) => return Ok(list_payload(items)),
                Err(Error::ListShape(msg)) => {
                    tracing::debug!(path = %path, reason = %msg, "collection read is not a list; reading single resource");
                }
                Err(err) => return Err(err),
            }
        }

        let not_found = match self.remote_get(path) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_not_found() => err,
            Err(err) => return Err(err),
        };

        let items = match self.remote_list(path, ListPolicy::default()) {
            Ok(items) => items,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(_) => return Err(not_found),
        };
        if !explicit_collection_target
            && !should_use_metadata_collection_fallback(self.metadata.as_deref_mut(), path, &items)
        {
            return Err(not_found);
        }
        tracing::debug!(path = %path, items = items.len(), "using collection fallback");
        Ok(list_payload(items))
    }
}

fn list_payload(mut items: Vec<Resource>) -> Value {
    items.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
    Value::Array(items.into_iter().map(|item| item.payload).collect())
}
