use restsync_core::path::{normalize_logical_path, parent_and_base};

use crate::store::{MetadataService, Resource};

/// Decides whether a path whose single-resource read returned `NotFound`
/// should be saved as the collection `items` that listing it produced.
///
/// Resolver failures count as "no", which keeps the single-resource reading.
pub fn should_use_metadata_collection_fallback(
    metadata: Option<&mut (dyn MetadataService + '_)>,
    logical_path: &str,
    items: &[Resource],
) -> bool {
    if items.is_empty() {
        return true;
    }
    let Some(metadata) = metadata else {
        return false;
    };
    let Ok(path) = normalize_logical_path(logical_path) else {
        return false;
    };
    let Some((parent, requested)) = parent_and_base(&path) else {
        return false;
    };

    {
        let Some(children) = metadata.collection_children() else {
            return false;
        };
        match children.resolve_collection_children(&parent) {
            Ok(children) => {
                if children.iter().any(|child| child.trim() == requested) {
                    return true;
                }
            }
            Err(err) => {
                tracing::debug!(path = %parent, err = %err, "collection children lookup failed");
                return false;
            }
        }
    }

    let Some(wildcard) = metadata.collection_wildcard() else {
        return false;
    };
    match wildcard.has_collection_wildcard_child(&parent) {
        Ok(found) => found,
        Err(err) => {
            tracing::debug!(path = %parent, err = %err, "collection wildcard lookup failed");
            false
        }
    }
}
