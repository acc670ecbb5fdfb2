//! Secret placeholders and plaintext-secret heuristics.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::attributes::{collect_key_paths, dedupe_and_sort, lookup_scalar};

pub const PLACEHOLDER: &str = "{{secret .}}";

const STRONG_PAIRS: &[(&str, &str)] = &[
    ("api", "key"),
    ("client", "secret"),
    ("access", "key"),
    ("access", "token"),
    ("private", "key"),
    ("bearer", "token"),
    ("refresh", "token"),
];

const COMPACT_FORMS: &[&str] = &[
    "apikey",
    "clientsecret",
    "accesskey",
    "accesstoken",
    "privatekey",
    "bearertoken",
    "refreshtoken",
];

const CORE_TOKENS: &[&str] = &["password", "passwd", "pwd", "passphrase", "secret", "token"];

const PAIR_PREFIX_TOKENS: &[&str] = &["api", "client", "access", "private", "bearer", "refresh"];

const NON_SECRET_QUALIFIERS: &[&str] = &[
    "mode", "type", "policy", "method", "strategy", "preference", "delivery", "conveyance",
    "endpoint", "url", "uri", "path", "lifetime", "lifespan", "ttl", "timeout", "duration",
    "expiry", "expires", "expiration", "validity", "issuer", "name", "id", "length", "size",
    "count", "min", "max", "enabled", "enable", "required", "supported", "allowed", "algorithm",
    "alg", "version", "scheme", "file", "ref", "reference", "claim", "claims", "header",
    "response", "exchange", "creation", "created", "time", "timestamp", "requested", "request",
    "use", "lower", "upper", "case", "format",
];

const NON_SECRET_VALUES: &[&str] = &[
    "true", "false", "yes", "no", "on", "off", "enabled", "disabled",
];

static TOKEN_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static regex"));

/// Builds the secret-store key for an attribute of a resource.
pub fn secret_key(logical_path: &str, attribute: &str) -> String {
    format!("{}:{}", logical_path.trim(), attribute.trim())
}

pub fn is_placeholder_value(value: &str) -> bool {
    let Some(inner) = value
        .trim()
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    else {
        return false;
    };
    let Some(argument) = inner.trim().strip_prefix("secret") else {
        return false;
    };

    let argument = argument.trim();
    if argument == "." {
        return true;
    }
    if argument.starts_with('"') {
        return serde_json::from_str::<String>(argument)
            .map(|parsed| !parsed.trim().is_empty())
            .unwrap_or(false);
    }
    !argument.is_empty() && !argument.chars().any(char::is_whitespace)
}

/// Rejects values that are obviously not secret material: numbers and
/// boolean-like toggles that live under secret-sounding keys.
pub fn is_likely_plaintext_value(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return false;
    }
    let lowered = trimmed.to_lowercase();
    !NON_SECRET_VALUES.contains(&lowered.as_str())
}

/// Splits an identifier such as `clientSecret` or `access.token.claim` into
/// lowercase tokens.
pub fn split_identifier_tokens(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in TOKEN_SEPARATOR.split(value) {
        let mut current = String::new();
        let mut previous: Option<char> = None;
        for ch in chunk.chars() {
            if ch.is_uppercase()
                && previous.is_some_and(|p| p.is_lowercase() || p.is_numeric())
                && !current.is_empty()
            {
                tokens.push(current.to_lowercase());
                current.clear();
            }
            current.push(ch);
            previous = Some(ch);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

pub fn is_likely_secret_key(key: &str) -> bool {
    let tokens = split_identifier_tokens(key);
    if tokens.is_empty() {
        return false;
    }
    if has_strong_secret_pair(&tokens) {
        return true;
    }
    if COMPACT_FORMS.contains(&tokens.concat().as_str()) {
        return true;
    }
    tokens
        .iter()
        .enumerate()
        .any(|(idx, token)| is_core(token) && is_standalone_core_token(&tokens, idx))
}

/// Built-in heuristic detector: bare key names whose string values look like
/// plaintext secrets, found anywhere in the value.
pub fn detect_secret_candidates(value: &Value) -> Vec<String> {
    let mut out = BTreeSet::new();
    collect_detected(value, &mut out);
    out.into_iter().collect()
}

/// Declared attributes whose leaves currently hold plaintext-looking values.
pub fn detect_declared_candidates<S: AsRef<str>>(value: &Value, declared: &[S]) -> Vec<String> {
    let Value::Object(payload) = value else {
        return Vec::new();
    };
    dedupe_and_sort(declared)
        .into_iter()
        .filter(|attribute| {
            lookup_scalar(payload, attribute).is_some_and(|leaf| {
                !leaf.trim().is_empty()
                    && !is_placeholder_value(&leaf)
                    && is_likely_plaintext_value(&leaf)
            })
        })
        .collect()
}

/// Expands candidates into concrete dotted attribute paths that still hold
/// unmasked values in `payload`.
///
/// Bare names match their key at any object depth; dotted names match only
/// themselves.
pub fn resolve_candidate_paths<S: AsRef<str>>(
    payload: &Map<String, Value>,
    candidates: &[S],
) -> Vec<String> {
    let mut out = BTreeSet::new();
    for candidate in candidates {
        let candidate = candidate.as_ref().trim();
        if candidate.is_empty() {
            continue;
        }
        if candidate.contains('.') {
            if lookup_scalar(payload, candidate)
                .is_some_and(|leaf| !leaf.trim().is_empty() && !is_placeholder_value(&leaf))
            {
                out.insert(candidate.to_string());
            }
            continue;
        }
        out.extend(collect_key_paths(payload, candidate, &|leaf| {
            leaf.as_str()
                .is_some_and(|s| !s.trim().is_empty() && !is_placeholder_value(s))
        }));
    }
    out.into_iter().collect()
}

fn collect_detected(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, field) in map {
                if let Value::String(s) = field
                    && is_likely_secret_key(key)
                    && !is_placeholder_value(s)
                    && is_likely_plaintext_value(s)
                {
                    out.insert(key.clone());
                }
                collect_detected(field, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_detected(item, out);
            }
        }
        _ => {}
    }
}

fn is_core(token: &str) -> bool {
    CORE_TOKENS.contains(&token)
}

fn is_qualifier(token: &str) -> bool {
    NON_SECRET_QUALIFIERS.contains(&token)
}

fn has_strong_secret_pair(tokens: &[String]) -> bool {
    for idx in 0..tokens.len().saturating_sub(1) {
        let pair = (tokens[idx].as_str(), tokens[idx + 1].as_str());
        if !STRONG_PAIRS.contains(&pair) {
            continue;
        }
        if idx > 0 && is_qualifier(&tokens[idx - 1]) {
            continue;
        }
        if idx + 1 == tokens.len() - 1 {
            return true;
        }
        if is_qualifier(&tokens[idx + 2]) {
            continue;
        }
        return true;
    }
    false
}

fn is_standalone_core_token(tokens: &[String], idx: usize) -> bool {
    if idx > 0 && is_qualifier(&tokens[idx - 1]) {
        return false;
    }
    if idx == tokens.len() - 1 {
        let qualified_pair = idx >= 2
            && is_qualifier(&tokens[idx - 2])
            && (is_core(&tokens[idx - 1])
                || PAIR_PREFIX_TOKENS.contains(&tokens[idx - 1].as_str()));
        return !qualified_pair;
    }
    if is_qualifier(&tokens[idx + 1]) {
        return false;
    }
    for token in &tokens[idx + 2..] {
        if is_core(token) {
            return true;
        }
        if is_qualifier(token) {
            return false;
        }
    }
    true
}
