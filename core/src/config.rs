use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::Result;
use crate::path::{WILDCARD_SEGMENT, normalize_save_path_pattern, pattern_matches, split_segments};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: String,
    /// Per-request timeout for the HTTP remote, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveRules {
    /// Segments whose following segment collapses to `_` when secret
    /// declarations are persisted for a whole collection.
    #[serde(default = "default_collapse_segments")]
    pub collapse_segments: Vec<String>,
    /// Payload keys tried, in order, when metadata does not identify a list item.
    #[serde(default = "default_fallback_aliases")]
    pub fallback_aliases: Vec<String>,
    /// Payload keys for items of specific collections, keyed by collection
    /// pattern (`_` matches any segment). Tried before `fallback_aliases`.
    #[serde(default = "default_list_aliases")]
    pub list_aliases: BTreeMap<String, Vec<String>>,
}

fn default_collapse_segments() -> Vec<String> {
    vec!["realms".to_string()]
}

fn default_fallback_aliases() -> Vec<String> {
    ["clientId", "id", "name", "alias", "key", "uuid", "uid"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_list_aliases() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([("/admin/realms".to_string(), vec!["realm".to_string()])])
}

impl Default for SaveRules {
    fn default() -> Self {
        Self {
            collapse_segments: default_collapse_segments(),
            fallback_aliases: default_fallback_aliases(),
            list_aliases: default_list_aliases(),
        }
    }
}

impl SaveRules {
    /// Keys tried for items listed under `collection_path`: those of the most
    /// specific matching `list_aliases` pattern, then `fallback_aliases`.
    pub fn alias_keys_for(&self, collection_path: &str) -> Vec<String> {
        let specific = self
            .list_aliases
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, collection_path))
            .min_by_key(|(pattern, _)| {
                split_segments(pattern)
                    .filter(|segment| *segment == WILDCARD_SEGMENT)
                    .count()
            })
            .map(|(_, keys)| keys.as_slice())
            .unwrap_or_default();
        specific
            .iter()
            .chain(&self.fallback_aliases)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    #[serde(default = "default_repository_dir")]
    pub repository_dir: String,
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,
    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub save: SaveRules,
}

fn default_repository_dir() -> String {
    "resources".to_string()
}

fn default_metadata_dir() -> String {
    "metadata".to_string()
}

fn default_secrets_file() -> String {
    "secrets.json".to_string()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            repository_dir: default_repository_dir(),
            metadata_dir: default_metadata_dir(),
            secrets_file: default_secrets_file(),
            remote: RemoteConfig::default(),
            save: SaveRules::default(),
        }
    }
}

impl RepoConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("repository_dir", &self.repository_dir),
            ("metadata_dir", &self.metadata_dir),
            ("secrets_file", &self.secrets_file),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{field} must be non-empty")));
            }
        }

        let base_url = self.remote.base_url.trim();
        if !base_url.is_empty()
            && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            return Err(Error::Validation(format!(
                "remote.base_url must start with http:// or https:// (got {base_url:?})"
            )));
        }
        if self.remote.timeout_ms == 0 {
            return Err(Error::Validation(
                "remote.timeout_ms must be > 0".to_string(),
            ));
        }

        for (idx, segment) in self.save.collapse_segments.iter().enumerate() {
            if segment.trim().is_empty() || segment.contains('/') {
                return Err(Error::Validation(format!(
                    "save.collapse_segments[{idx}] must be a single non-empty path segment"
                )));
            }
        }
        if self.save.fallback_aliases.is_empty() {
            return Err(Error::Validation(
                "save.fallback_aliases must be non-empty".to_string(),
            ));
        }
        for (idx, key) in self.save.fallback_aliases.iter().enumerate() {
            if key.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "save.fallback_aliases[{idx}] must be non-empty"
                )));
            }
        }
        for (pattern, keys) in &self.save.list_aliases {
            normalize_save_path_pattern(pattern).map_err(|err| {
                Error::Validation(format!("save.list_aliases key {pattern:?}: {err}"))
            })?;
            if keys.is_empty() || keys.iter().any(|key| key.trim().is_empty()) {
                return Err(Error::Validation(format!(
                    "save.list_aliases[{pattern:?}] must list non-empty keys"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RepoConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut config = RepoConfig::default();
        config.remote.base_url = "ftp://example".to_string();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_multi_segment_collapse_rule() {
        let mut config = RepoConfig::default();
        config.save.collapse_segments = vec!["a/b".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn list_aliases_prefer_the_most_specific_pattern() {
        let mut rules = SaveRules {
            fallback_aliases: vec!["id".to_string()],
            ..Default::default()
        };
        rules
            .list_aliases
            .insert("/admin/realms/_/users".to_string(), vec!["username".to_string()]);
        rules.list_aliases.insert(
            "/admin/realms/master/users".to_string(),
            vec!["email".to_string()],
        );

        assert_eq!(rules.alias_keys_for("/admin/realms"), vec!["realm", "id"]);
        assert_eq!(
            rules.alias_keys_for("/admin/realms/other/users"),
            vec!["username", "id"]
        );
        assert_eq!(
            rules.alias_keys_for("/admin/realms/master/users"),
            vec!["email", "id"]
        );
        assert_eq!(rules.alias_keys_for("/customers"), vec!["id"]);
    }

    #[test]
    fn rejects_invalid_list_aliases() {
        let mut config = RepoConfig::default();
        config
            .save
            .list_aliases
            .insert("/admin/groups".to_string(), Vec::new());
        assert!(config.validate().is_err());

        let mut config = RepoConfig::default();
        config
            .save
            .list_aliases
            .insert("groups".to_string(), vec!["name".to_string()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("save.list_aliases"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = serde_json::from_str::<RepoConfig>(r#"{"repo":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
