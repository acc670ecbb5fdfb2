use serde::{Deserialize, Serialize};

use crate::attributes::dedupe_and_sort;

/// Per-path metadata declared by operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_from_attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_from_attribute: Option<String>,
    /// Dotted attribute paths known to hold secrets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets_from_attributes: Vec<String>,
}

impl ResourceMetadata {
    pub fn alias_attribute(&self) -> Option<&str> {
        non_blank(self.alias_from_attribute.as_deref())
    }

    pub fn id_attribute(&self) -> Option<&str> {
        non_blank(self.id_from_attribute.as_deref())
    }

    pub fn declared_secrets(&self) -> Vec<String> {
        dedupe_and_sort(&self.secrets_from_attributes)
    }

    pub fn merge_secret_attributes<S: AsRef<str>>(&mut self, detected: &[S]) {
        let merged = self
            .secrets_from_attributes
            .iter()
            .map(String::as_str)
            .chain(detected.iter().map(|s| s.as_ref()));
        self.secrets_from_attributes = dedupe_and_sort(merged);
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_dedupes_and_sorts() {
        let mut md = ResourceMetadata {
            secrets_from_attributes: vec!["token".to_string(), "password".to_string()],
            ..ResourceMetadata::default()
        };
        md.merge_secret_attributes(&["password", " clientSecret "]);
        assert_eq!(
            md.secrets_from_attributes,
            vec!["clientSecret", "password", "token"]
        );
    }

    #[test]
    fn blank_identity_attributes_are_ignored() {
        let md = ResourceMetadata {
            alias_from_attribute: Some("  ".to_string()),
            id_from_attribute: Some(" id ".to_string()),
            ..ResourceMetadata::default()
        };
        assert_eq!(md.alias_attribute(), None);
        assert_eq!(md.id_attribute(), Some("id"));
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let md: ResourceMetadata = serde_json::from_str(
            r#"{"aliasFromAttribute":"clientId","secretsFromAttributes":["secret"]}"#,
        )
        .unwrap();
        assert_eq!(md.alias_attribute(), Some("clientId"));
        assert_eq!(md.declared_secrets(), vec!["secret"]);
    }
}
