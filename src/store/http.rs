//! Remote server reads over HTTP.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use restsync_core::config::{RemoteConfig, SaveRules};
use restsync_core::path::{join_logical_path, normalize_logical_path};
use restsync_core::{Error, Result};
use serde_json::Value;

use super::{ListPolicy, Orchestrator, Resource};
use crate::save::fallback_alias;

pub struct HttpRemote {
    client: Client,
    base_url: String,
    rules: SaveRules,
}

impl HttpRemote {
    /// `rules` supply the item attributes tried, per collection, to derive
    /// each listed item's path segment.
    pub fn new(config: &RemoteConfig, rules: SaveRules) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Validation(
                "remote.base_url is required to read from the remote server".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| Error::Transport(format!("build http client: {err}")))?;
        Ok(Self {
            client,
            base_url,
            rules,
        })
    }

    fn fetch(&self, logical_path: &str) -> Result<Value> {
        let path = normalize_logical_path(logical_path)?;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|err| Error::Transport(format!("GET {url}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &path));
        }
        response
            .json::<Value>()
            .map_err(|err| Error::Transport(format!("GET {url}: invalid json body: {err}")))
    }
}

fn status_error(status: StatusCode, path: &str) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(format!("remote resource {path:?} not found")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("remote rejected access to {path:?} ({status})"))
        }
        StatusCode::CONFLICT => Error::Conflict(format!("remote reported conflict at {path:?}")),
        other => Error::Transport(format!("remote returned {other} for {path:?}")),
    }
}

/// Turns a collection body into resources below `collection_path`.
fn list_items(collection_path: &str, body: Value, alias_keys: &[String]) -> Result<Vec<Resource>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::ListShape(format!(
                    "{collection_path:?} returned an object without an \"items\" array"
                )));
            }
        },
        _ => {
            return Err(Error::ListShape(format!(
                "{collection_path:?} returned a non-list body"
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let Value::Object(map) = &item else {
                return Err(Error::ListShape(format!(
                    "{collection_path:?} item {idx} is not an object"
                )));
            };
            let Some(alias) = fallback_alias(map, alias_keys) else {
                return Err(Error::ListShape(format!(
                    "{collection_path:?} item {idx} has none of the attributes [{}]",
                    alias_keys.join(", ")
                )));
            };
            Ok(Resource {
                logical_path: join_logical_path(collection_path, &alias)?,
                payload: item,
            })
        })
        .collect()
}

impl Orchestrator for HttpRemote {
    fn get_remote(&mut self, logical_path: &str) -> Result<Value> {
        self.fetch(logical_path)
    }

    fn list_remote(&mut self, logical_path: &str, policy: ListPolicy) -> Result<Vec<Resource>> {
        if policy.recursive {
            tracing::debug!(path = %logical_path, "recursive listing is served one level deep");
        }
        let path = normalize_logical_path(logical_path)?;
        let body = self.fetch(&path)?;
        let alias_keys = self.rules.alias_keys_for(&path);
        list_items(&path, body, &alias_keys)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn keys() -> Vec<String> {
        vec!["clientId".to_string(), "id".to_string()]
    }

    #[test]
    fn list_items_accepts_arrays_and_item_envelopes() {
        let items = list_items("/clients", json!([{"id": "b"}, {"clientId": "a", "id": 7}]), &keys())
            .unwrap();
        let paths: Vec<_> = items.iter().map(|r| r.logical_path.as_str()).collect();
        assert_eq!(paths, vec!["/clients/b", "/clients/a"]);

        let items = list_items("/", json!({"items": [{"id": 3}]}), &keys()).unwrap();
        assert_eq!(items[0].logical_path, "/3");
    }

    #[test]
    fn realm_listings_take_the_realm_name() {
        let rules = SaveRules::default();
        let body = json!([
            {"id": "0b7c7e5e-8d2a-4a52-9a57-3ad5b0f6c1d4", "realm": "master"},
            {"id": "f3f1c2d0-1111-4e3b-9b3e-0c9f7a2e5b61", "realm": "acme"},
        ]);
        let items = list_items("/admin/realms", body, &rules.alias_keys_for("/admin/realms"))
            .unwrap();
        let paths: Vec<_> = items.iter().map(|r| r.logical_path.as_str()).collect();
        assert_eq!(paths, vec!["/admin/realms/master", "/admin/realms/acme"]);

        let body = json!([{"id": "u-1", "username": "alice"}]);
        let items = list_items(
            "/admin/realms/master/users",
            body,
            &rules.alias_keys_for("/admin/realms/master/users"),
        )
        .unwrap();
        assert_eq!(items[0].logical_path, "/admin/realms/master/users/u-1");
    }

    #[test]
    fn list_items_rejects_non_lists() {
        for body in [json!({"id": "x"}), json!("text"), json!([1]), json!([{"name": "x"}])] {
            assert!(matches!(
                list_items("/clients", body, &keys()),
                Err(Error::ListShape(_))
            ));
        }
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(status_error(StatusCode::NOT_FOUND, "/a").is_not_found());
        assert_eq!(status_error(StatusCode::FORBIDDEN, "/a").code(), "auth");
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, "/a").code(), "auth");
        assert_eq!(status_error(StatusCode::CONFLICT, "/a").code(), "conflict");
        assert_eq!(status_error(StatusCode::BAD_GATEWAY, "/a").code(), "transport");
    }

    #[test]
    fn base_url_is_required() {
        let err = HttpRemote::new(&RemoteConfig::default(), SaveRules::default())
            .map(|_| ())
            .unwrap_err();
        assert!(err.is_validation());
    }
}
