use std::collections::BTreeSet;

use restsync_core::attributes::{dedupe_and_sort, find_parent_mut, lookup_scalar};
use restsync_core::config::SaveRules;
use restsync_core::path::{WILDCARD_SEGMENT, normalize_logical_path};
use restsync_core::secrets::{
    PLACEHOLDER, detect_declared_candidates, detect_secret_candidates, is_placeholder_value,
    resolve_candidate_paths, secret_key,
};
use restsync_core::{Error, Result};
use serde_json::{Map, Value};

use super::{SaveEngine, SaveEntry};

/// Candidates that block a save: everything not declared, unless `ignore`.
pub fn filter_for_safety<S: AsRef<str>>(
    candidates: &[S],
    declared: &[S],
    ignore: bool,
) -> Vec<String> {
    if ignore {
        return Vec::new();
    }
    let declared: BTreeSet<String> = dedupe_and_sort(declared).into_iter().collect();
    dedupe_and_sort(candidates)
        .into_iter()
        .filter(|candidate| !declared.contains(candidate))
        .collect()
}

pub fn safety_error<S: AsRef<str>>(logical_path: &str, blocking: &[S]) -> Error {
    let attributes: Vec<&str> = blocking.iter().map(|s| s.as_ref()).collect();
    Error::Validation(format!(
        "potential plaintext secrets detected for {logical_path:?} at attributes [{}]; refusing to save without --ignore",
        attributes.join(", ")
    ))
}

/// Attributes that block a save: undeclared candidates plus anything the
/// masking step left in plaintext, unless `ignore`.
pub fn blocking_attributes(
    candidates: &[String],
    declared: &[String],
    unmasked: &[String],
    ignore: bool,
) -> Vec<String> {
    if ignore {
        return Vec::new();
    }
    let mut out: BTreeSet<String> = filter_for_safety(candidates, declared, false)
        .into_iter()
        .collect();
    out.extend(dedupe_and_sort(unmasked));
    out.into_iter().collect()
}

struct Masked {
    value: Value,
    handled: Vec<String>,
    unmasked: Vec<String>,
}

/// Metadata path under which a collection's secret declarations are stored.
///
/// The segment following the first collapse segment becomes `_`, so
/// `/admin/realms/master/clients` declares for `/admin/realms/_/clients`.
pub fn collection_metadata_path(collection_path: &str, rules: &SaveRules) -> String {
    let Ok(normalized) = normalize_logical_path(collection_path) else {
        return collection_path.trim().to_string();
    };
    let mut segments: Vec<String> = normalized
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(idx) = segments
        .iter()
        .take(segments.len().saturating_sub(1))
        .position(|seg| rules.collapse_segments.iter().any(|c| c == seg))
    {
        let next = &mut segments[idx + 1];
        if !next.trim().is_empty() && next.as_str() != WILDCARD_SEGMENT {
            *next = WILDCARD_SEGMENT.to_string();
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// Splits detected candidates into those to handle and those left over.
///
/// An empty request selects everything. Requested names that were not
/// detected are an error unless `best_effort`.
pub(super) fn select_candidates(
    candidates: &[String],
    requested: &[String],
    best_effort: bool,
) -> Result<(Vec<String>, Vec<String>)> {
    let candidates = dedupe_and_sort(candidates);
    if requested.is_empty() {
        return Ok((candidates, Vec::new()));
    }

    let detected: BTreeSet<&str> = candidates.iter().map(String::as_str).collect();
    let mut selected = Vec::new();
    for name in dedupe_and_sort(requested) {
        if !detected.contains(name.as_str()) {
            if best_effort {
                continue;
            }
            return Err(Error::Validation(format!(
                "requested --handle-secrets attribute {name:?} was not detected"
            )));
        }
        selected.push(name);
    }

    let unhandled = candidates
        .iter()
        .filter(|c| !selected.contains(c))
        .cloned()
        .collect();
    Ok((selected, unhandled))
}

fn intersect(candidates: &[String], declared: &[String]) -> Vec<String> {
    let declared: BTreeSet<String> = dedupe_and_sort(declared).into_iter().collect();
    dedupe_and_sort(candidates)
        .into_iter()
        .filter(|c| declared.contains(c))
        .collect()
}

impl SaveEngine<'_> {
    fn heuristic_candidates(&mut self, value: &Value) -> Result<Vec<String>> {
        self.cancel.check()?;
        match self.secrets.as_deref_mut() {
            Some(provider) => provider.detect_secret_candidates(value),
            None => Ok(detect_secret_candidates(value)),
        }
    }

    pub(super) fn declared_secrets(&mut self, logical_path: &str) -> Result<Vec<String>> {
        Ok(self.resolve_metadata(logical_path)?.declared_secrets())
    }

    /// Heuristic candidates plus declared attributes that still hold plaintext.
    pub(super) fn detect_candidates(
        &mut self,
        logical_path: &str,
        value: &Value,
    ) -> Result<Vec<String>> {
        let mut out: BTreeSet<String> = self.heuristic_candidates(value)?.into_iter().collect();
        let declared = self.declared_secrets(logical_path)?;
        out.extend(detect_declared_candidates(value, &declared));
        Ok(dedupe_and_sort(out))
    }

    pub(super) fn detect_candidates_for_collection(
        &mut self,
        collection_path: &str,
        entries: &[SaveEntry],
    ) -> Result<Vec<String>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let declared = self.declared_secrets(collection_path)?;
        let mut out = BTreeSet::new();
        for entry in entries {
            out.extend(self.heuristic_candidates(&entry.payload)?);
            out.extend(detect_declared_candidates(&entry.payload, &declared));
        }
        Ok(dedupe_and_sort(out))
    }

    /// Fails unless the value is safe to write: no undeclared candidates and
    /// nothing left unmasked by the masking step.
    pub(super) fn enforce_safety(
        &mut self,
        logical_path: &str,
        value: &Value,
        unmasked: &[String],
        ignore: bool,
    ) -> Result<()> {
        let candidates = self.detect_candidates(logical_path, value)?;
        let declared = self.declared_secrets(logical_path)?;
        let blocking = blocking_attributes(&candidates, &declared, unmasked, ignore);
        if blocking.is_empty() {
            Ok(())
        } else {
            Err(safety_error(logical_path, &blocking))
        }
    }

    /// Masks detected candidates that metadata already declares as secrets.
    ///
    /// Returns the value and the declared candidates that stayed plaintext.
    pub(super) fn auto_handle_declared(
        &mut self,
        logical_path: &str,
        value: Value,
    ) -> Result<(Value, Vec<String>)> {
        let candidates = self.detect_candidates(logical_path, &value)?;
        if candidates.is_empty() {
            return Ok((value, Vec::new()));
        }
        let declared = self.declared_secrets(logical_path)?;
        let selected = intersect(&candidates, &declared);
        if selected.is_empty() {
            return Ok((value, Vec::new()));
        }
        let masked = self.apply_candidates(logical_path, value, &selected)?;
        Ok((masked.value, masked.unmasked))
    }

    /// Handles the requested candidates (all when empty) and declares the
    /// handled attributes in the path's metadata.
    ///
    /// Returns the masked value, the candidates that were not selected and the
    /// selected ones that could not be masked.
    pub(super) fn explicit_handle(
        &mut self,
        logical_path: &str,
        value: Value,
        requested: &[String],
    ) -> Result<(Value, Vec<String>, Vec<String>)> {
        let candidates = self.detect_candidates(logical_path, &value)?;
        if candidates.is_empty() {
            return Ok((value, Vec::new(), Vec::new()));
        }
        let (selected, unhandled) = select_candidates(&candidates, requested, false)?;
        let masked = self.apply_candidates(logical_path, value, &selected)?;
        self.persist_secret_attributes(logical_path, &masked.handled)?;
        Ok((masked.value, unhandled, masked.unmasked))
    }

    pub(super) fn auto_handle_entries(
        &mut self,
        entries: Vec<SaveEntry>,
        candidates: &[String],
        declared: &[String],
    ) -> Result<(Vec<SaveEntry>, Vec<String>)> {
        let selected = intersect(candidates, declared);
        if selected.is_empty() {
            return Ok((entries, Vec::new()));
        }
        self.require_secrets()?;
        self.apply_to_entries(entries, &selected)
    }

    /// Masks `selected` in every entry; also returns the selected candidates
    /// that stayed plaintext in any entry.
    pub(super) fn apply_to_entries(
        &mut self,
        entries: Vec<SaveEntry>,
        selected: &[String],
    ) -> Result<(Vec<SaveEntry>, Vec<String>)> {
        if entries.is_empty() || selected.is_empty() {
            return Ok((entries, Vec::new()));
        }
        let mut unmasked = BTreeSet::new();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let masked = self.apply_candidates(&entry.logical_path, entry.payload, selected)?;
            unmasked.extend(masked.unmasked);
            out.push(SaveEntry {
                logical_path: entry.logical_path,
                payload: masked.value,
            });
        }
        Ok((out, unmasked.into_iter().collect()))
    }

    /// Stores and masks every concrete attribute path the candidates resolve to.
    fn apply_candidates(
        &mut self,
        logical_path: &str,
        value: Value,
        selected: &[String],
    ) -> Result<Masked> {
        if selected.is_empty() {
            return Ok(Masked {
                value,
                handled: Vec::new(),
                unmasked: Vec::new(),
            });
        }
        let Value::Object(mut payload) = value else {
            return Err(Error::Validation(
                "--handle-secrets requires object payloads".to_string(),
            ));
        };
        let cancel = self.cancel.clone();
        let provider = self.require_secrets()?;

        let handled = resolve_candidate_paths(&payload, selected);
        for attribute in &handled {
            cancel.check()?;
            store_and_mask(&mut *provider, &mut payload, logical_path, attribute)?;
        }

        let value = Value::Object(payload);
        let unmasked = self.remaining_plaintext(&value, selected)?;
        if !unmasked.is_empty() {
            tracing::debug!(path = %logical_path, attributes = ?unmasked, "secret candidates left unmasked");
        }
        Ok(Masked {
            value,
            handled,
            unmasked,
        })
    }

    /// Selected candidates that are still detected after masking, such as
    /// values nested in arrays.
    fn remaining_plaintext(&mut self, value: &Value, selected: &[String]) -> Result<Vec<String>> {
        let mut found: BTreeSet<String> = self.heuristic_candidates(value)?.into_iter().collect();
        found.extend(detect_declared_candidates(value, selected));
        Ok(found
            .into_iter()
            .filter(|candidate| selected.contains(candidate))
            .collect())
    }

    /// Merges `attributes` into the secret declarations stored at `metadata_path`.
    pub(super) fn persist_secret_attributes(
        &mut self,
        metadata_path: &str,
        attributes: &[String],
    ) -> Result<()> {
        let attributes = dedupe_and_sort(attributes);
        if attributes.is_empty() {
            return Ok(());
        }
        let metadata = self.require_metadata()?;
        let mut current = match metadata.get(metadata_path) {
            Ok(md) => md,
            Err(err) if err.is_not_found() => Default::default(),
            Err(err) => return Err(err),
        };
        current.merge_secret_attributes(&attributes);
        metadata.set(metadata_path, current)?;
        tracing::info!(path = %metadata_path, attributes = ?attributes, "declared secret attributes");
        Ok(())
    }
}

fn store_and_mask(
    provider: &mut dyn crate::store::SecretProvider,
    payload: &mut Map<String, Value>,
    logical_path: &str,
    attribute: &str,
) -> Result<()> {
    let Some(secret) = lookup_scalar(payload, attribute) else {
        return Ok(());
    };
    if secret.trim().is_empty() || is_placeholder_value(&secret) {
        return Ok(());
    }
    let Some((parent, leaf)) = find_parent_mut(payload, attribute) else {
        return Ok(());
    };

    provider.store(&secret_key(logical_path, attribute), &secret)?;
    parent.insert(leaf, Value::String(PLACEHOLDER.to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn safety_filter_drops_declared_and_honors_ignore() {
        let candidates = strings(&["password", "token"]);
        let declared = strings(&["token"]);
        assert_eq!(filter_for_safety(&candidates, &declared, false), vec!["password"]);
        assert!(filter_for_safety(&candidates, &declared, true).is_empty());
    }

    #[test]
    fn unmasked_candidates_block_even_when_declared() {
        let candidates = strings(&["password", "token"]);
        let declared = strings(&["password", "token"]);
        let unmasked = strings(&["password"]);
        assert_eq!(
            blocking_attributes(&candidates, &declared, &unmasked, false),
            vec!["password"]
        );
        assert!(blocking_attributes(&candidates, &declared, &unmasked, true).is_empty());
        assert_eq!(
            blocking_attributes(&candidates, &strings(&["token"]), &unmasked, false),
            vec!["password"]
        );
    }

    #[test]
    fn safety_error_lists_sorted_attributes() {
        let err = safety_error("/customers/acme", &strings(&["password", "token"]));
        assert_eq!(
            err.to_string(),
            "potential plaintext secrets detected for \"/customers/acme\" at attributes [password, token]; refusing to save without --ignore"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn select_candidates_requires_detected_names_unless_best_effort() {
        let candidates = strings(&["password", "secret"]);
        let (selected, unhandled) = select_candidates(&candidates, &[], false).unwrap();
        assert_eq!(selected, candidates);
        assert!(unhandled.is_empty());

        let (selected, unhandled) =
            select_candidates(&candidates, &strings(&["secret"]), false).unwrap();
        assert_eq!(selected, vec!["secret"]);
        assert_eq!(unhandled, vec!["password"]);

        let err = select_candidates(&candidates, &strings(&["token"]), false).unwrap_err();
        assert!(err.to_string().contains("\"token\" was not detected"));

        let (selected, unhandled) =
            select_candidates(&candidates, &strings(&["token", "secret"]), true).unwrap();
        assert_eq!(selected, vec!["secret"]);
        assert_eq!(unhandled, vec!["password"]);
    }

    #[test]
    fn collection_metadata_path_collapses_realm_instance() {
        let rules = SaveRules::default();
        assert_eq!(
            collection_metadata_path("/admin/realms/master/clients", &rules),
            "/admin/realms/_/clients"
        );
        assert_eq!(collection_metadata_path("/customers", &rules), "/customers");
        assert_eq!(collection_metadata_path("/admin/realms", &rules), "/admin/realms");
        assert_eq!(collection_metadata_path("/", &rules), "/");
    }
}
