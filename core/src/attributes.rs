//! Dotted attribute paths into JSON object payloads.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Looks up a dotted attribute and renders it as a scalar string.
///
/// Returns `None` for missing attributes, non-scalar leaves and empty strings.
pub fn lookup_scalar(payload: &Map<String, Value>, attribute: &str) -> Option<String> {
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return None;
    }

    let mut current = payload;
    let mut segments = attribute.split('.').map(str::trim).peekable();
    while let Some(segment) = segments.next() {
        if segment.is_empty() {
            return None;
        }
        let next = current.get(segment)?;
        if segments.peek().is_none() {
            return scalar_string(next);
        }
        current = next.as_object()?;
    }
    None
}

pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Finds the object holding the leaf of a dotted attribute, plus the leaf key.
///
/// The leaf key must already exist in the returned object.
pub fn find_parent_mut<'a>(
    payload: &'a mut Map<String, Value>,
    attribute: &str,
) -> Option<(&'a mut Map<String, Value>, String)> {
    let segments: Vec<&str> = attribute.trim().split('.').map(str::trim).collect();
    let (leaf, parents) = segments.split_last()?;
    if leaf.is_empty() {
        return None;
    }

    let mut current = payload;
    for segment in parents {
        if segment.is_empty() {
            return None;
        }
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    if !current.contains_key(*leaf) {
        return None;
    }
    Some((current, (*leaf).to_string()))
}

/// Collects every dotted path in `value` whose final key equals `key` and
/// whose leaf satisfies `accept`. Arrays are not descended.
pub fn collect_key_paths(
    payload: &Map<String, Value>,
    key: &str,
    accept: &dyn Fn(&Value) -> bool,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_into(payload, "", key, accept, &mut out);
    out
}

fn collect_into(
    payload: &Map<String, Value>,
    prefix: &str,
    key: &str,
    accept: &dyn Fn(&Value) -> bool,
    out: &mut BTreeSet<String>,
) {
    for (field, value) in payload {
        let path = if prefix.is_empty() {
            field.clone()
        } else {
            format!("{prefix}.{field}")
        };
        if field == key && accept(value) {
            out.insert(path.clone());
        }
        if let Value::Object(child) = value {
            collect_into(child, &path, key, accept, out);
        }
    }
}

/// Trims, drops empties, dedupes and sorts attribute names.
pub fn dedupe_and_sort<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lookup_scalar_walks_nested_objects() {
        let payload = obj(json!({"a": {"b": {"c": "x"}}, "n": 42, "t": true, "e": ""}));
        assert_eq!(lookup_scalar(&payload, "a.b.c").as_deref(), Some("x"));
        assert_eq!(lookup_scalar(&payload, " n ").as_deref(), Some("42"));
        assert_eq!(lookup_scalar(&payload, "t").as_deref(), Some("true"));
        assert_eq!(lookup_scalar(&payload, "e"), None);
        assert_eq!(lookup_scalar(&payload, "a.b"), None);
        assert_eq!(lookup_scalar(&payload, "a..c"), None);
        assert_eq!(lookup_scalar(&payload, "missing"), None);
    }

    #[test]
    fn find_parent_mut_requires_existing_leaf() {
        let mut payload = obj(json!({"creds": {"password": "p"}}));
        let (parent, leaf) = find_parent_mut(&mut payload, "creds.password").unwrap();
        assert_eq!(leaf, "password");
        parent.insert(leaf, json!("masked"));
        assert_eq!(payload["creds"]["password"], json!("masked"));
        assert!(find_parent_mut(&mut payload, "creds.token").is_none());
        assert!(find_parent_mut(&mut payload, "creds.password.x").is_none());
    }

    #[test]
    fn collect_key_paths_skips_arrays() {
        let payload = obj(json!({
            "secret": "a",
            "nested": {"secret": "b"},
            "list": [{"secret": "c"}]
        }));
        let paths = collect_key_paths(&payload, "secret", &|v| v.is_string());
        assert_eq!(
            paths.into_iter().collect::<Vec<_>>(),
            vec!["nested.secret".to_string(), "secret".to_string()]
        );
    }

    #[test]
    fn dedupe_and_sort_trims_and_drops_empty() {
        assert_eq!(
            dedupe_and_sort(["b", " a", "", "b ", "  "]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
