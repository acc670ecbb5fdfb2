use restsync_core::attributes::lookup_scalar;
use restsync_core::metadata::ResourceMetadata;
use restsync_core::{Error, Result};
use serde_json::{Map, Value};

/// Picks the path segment for one list item.
///
/// Declared metadata wins; otherwise the first non-empty scalar among
/// `fallback_keys`. When neither yields an alias the metadata error is
/// returned.
pub fn resolve_list_item_alias(
    item: &Map<String, Value>,
    metadata: &ResourceMetadata,
    fallback_keys: &[String],
) -> Result<String> {
    let declared = declared_alias(item, metadata);
    if let Ok(alias) = &declared {
        return Ok(alias.clone());
    }
    if let Some(alias) = fallback_alias(item, fallback_keys) {
        return Ok(alias);
    }
    declared
}

pub fn fallback_alias(item: &Map<String, Value>, fallback_keys: &[String]) -> Option<String> {
    fallback_keys.iter().find_map(|key| non_blank_scalar(item, key))
}

fn declared_alias(item: &Map<String, Value>, metadata: &ResourceMetadata) -> Result<String> {
    metadata
        .alias_attribute()
        .and_then(|attr| non_blank_scalar(item, attr))
        .or_else(|| {
            metadata
                .id_attribute()
                .and_then(|attr| non_blank_scalar(item, attr))
        })
        .ok_or_else(|| {
            Error::Validation(
                "list item alias could not be resolved from metadata attributes".to_string(),
            )
        })
}

fn non_blank_scalar(item: &Map<String, Value>, attribute: &str) -> Option<String> {
    lookup_scalar(item, attribute)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
