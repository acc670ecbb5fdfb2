use std::collections::BTreeSet;

use restsync_core::metadata::ResourceMetadata;
use restsync_core::path::{join_logical_path, normalize_logical_path};
use restsync_core::{Error, Result};
use serde_json::{Map, Value};

use super::SaveEngine;
use super::identity::resolve_list_item_alias;

const ENTRY_PATH_KEY: &str = "LogicalPath";
const ENTRY_PAYLOAD_KEY: &str = "Payload";

/// One resource about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveEntry {
    pub logical_path: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadShape {
    Single(Value),
    List(Vec<Value>),
}

/// Arrays and objects with an `items` array are lists; everything else is a
/// single resource.
pub fn classify_payload(value: Value) -> Result<PayloadShape> {
    match value {
        Value::Array(items) => Ok(PayloadShape::List(items)),
        Value::Object(mut map) if map.contains_key("items") => match map.remove("items") {
            Some(Value::Array(items)) => Ok(PayloadShape::List(items)),
            _ => Err(Error::Validation(
                "list payload \"items\" must be an array".to_string(),
            )),
        },
        other => Ok(PayloadShape::Single(other)),
    }
}

impl SaveEngine<'_> {
    /// Resolves every list item to a logical path below `collection_path`.
    ///
    /// The result is sorted by path and free of duplicates.
    pub(super) fn resolve_entries(
        &mut self,
        collection_path: &str,
        items: Vec<Value>,
    ) -> Result<Vec<SaveEntry>> {
        let collection_path = normalize_logical_path(collection_path)?;
        let mut entries = Vec::with_capacity(items.len());
        let mut seen = BTreeSet::new();
        let mut metadata: Option<ResourceMetadata> = None;
        let alias_keys = self.rules.alias_keys_for(&collection_path);

        for item in items {
            let Value::Object(item) = item else {
                return Err(Error::Validation(
                    "list payload entries must be JSON objects".to_string(),
                ));
            };

            let entry = match pre_resolved_entry(&item)? {
                Some(entry) => entry,
                None => {
                    if metadata.is_none() {
                        self.require_metadata()?;
                        metadata = Some(self.resolve_metadata(&collection_path)?);
                    }
                    let md = metadata.get_or_insert_with(ResourceMetadata::default);
                    let alias = resolve_list_item_alias(&item, md, &alias_keys)
                        .map_err(|err| {
                            Error::Validation(format!(
                                "list item alias could not be resolved; configure metadata alias/id attributes or use --as-one-resource: {err}"
                            ))
                        })?;
                    SaveEntry {
                        logical_path: join_logical_path(&collection_path, &alias)?,
                        payload: Value::Object(item),
                    }
                }
            };

            if !seen.insert(entry.logical_path.clone()) {
                return Err(Error::Validation(format!(
                    "list payload contains duplicate resource path {:?}",
                    entry.logical_path
                )));
            }
            entries.push(entry);
        }

        entries.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
        Ok(entries)
    }
}

fn pre_resolved_entry(item: &Map<String, Value>) -> Result<Option<SaveEntry>> {
    let path = item.get(ENTRY_PATH_KEY);
    let payload = item.get(ENTRY_PAYLOAD_KEY);
    match (path, payload) {
        (None, None) => Ok(None),
        (Some(path), Some(payload)) => {
            let path = path
                .as_str()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    Error::Validation(
                        "resource list entry \"LogicalPath\" must be a non-empty string"
                            .to_string(),
                    )
                })?;
            Ok(Some(SaveEntry {
                logical_path: normalize_logical_path(path)?,
                payload: payload.clone(),
            }))
        }
        _ => Err(Error::Validation(
            "resource list entry must include both \"LogicalPath\" and \"Payload\"".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn arrays_and_items_objects_are_lists() {
        assert_eq!(
            classify_payload(json!([{"id": 1}])).unwrap(),
            PayloadShape::List(vec![json!({"id": 1})])
        );
        assert_eq!(
            classify_payload(json!({"items": [], "total": 0})).unwrap(),
            PayloadShape::List(Vec::new())
        );
        assert_eq!(
            classify_payload(json!({"id": 1})).unwrap(),
            PayloadShape::Single(json!({"id": 1}))
        );
        assert_eq!(
            classify_payload(json!("scalar")).unwrap(),
            PayloadShape::Single(json!("scalar"))
        );
    }

    #[test]
    fn items_must_be_an_array() {
        assert!(matches!(
            classify_payload(json!({"items": {"a": 1}})),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn pre_resolved_entries_need_both_keys() {
        let item = json!({"LogicalPath": "/a/b/", "Payload": {"x": 1}});
        let entry = pre_resolved_entry(item.as_object().unwrap()).unwrap().unwrap();
        assert_eq!(entry.logical_path, "/a/b");
        assert_eq!(entry.payload, json!({"x": 1}));

        let item = json!({"LogicalPath": "/a/b"});
        assert!(pre_resolved_entry(item.as_object().unwrap()).is_err());
        let item = json!({"LogicalPath": " ", "Payload": {}});
        assert!(pre_resolved_entry(item.as_object().unwrap()).is_err());
        let item = json!({"id": "x"});
        assert!(pre_resolved_entry(item.as_object().unwrap()).unwrap().is_none());
    }
}
