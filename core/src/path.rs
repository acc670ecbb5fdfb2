//! Logical path handling.
//!
//! Logical paths are absolute, `/`-separated identifiers such as
//! `/customers/acme`. The root is `/`; every other path has no trailing slash.
//! The segment `_` is reserved for wildcard patterns and metadata templates.

use crate::error::validation;
use crate::Result;

pub const ROOT: &str = "/";
pub const WILDCARD_SEGMENT: &str = "_";

/// A normalized save path, possibly containing `_` wildcard segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePathPattern {
    pub path: String,
    pub has_wildcard: bool,
    /// The caller wrote a trailing slash, asking for the collection itself.
    pub explicit_collection_target: bool,
}

pub fn normalize_save_path_pattern(raw: &str) -> Result<SavePathPattern> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(validation("path is required"));
    }
    let explicit_collection_target = trimmed != ROOT && trimmed.ends_with('/');

    let path = clean_absolute(trimmed, PathKind::Pattern)?;
    let has_wildcard = split_segments(&path).any(|seg| seg == WILDCARD_SEGMENT);

    Ok(SavePathPattern {
        path,
        has_wildcard,
        explicit_collection_target,
    })
}

pub fn normalize_logical_path(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(validation("logical path must not be empty"));
    }
    clean_absolute(raw, PathKind::Concrete)
}

/// Appends one segment to `collection_path`.
///
/// The segment must be a single path component: no separators, no `.` or `..`.
pub fn join_logical_path(collection_path: &str, segment: &str) -> Result<String> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(validation("logical path segment must not be empty"));
    }
    if segment.contains(['/', '\\']) || segment == "." || segment == ".." {
        return Err(validation(format!(
            "logical path segment {segment:?} must be a single path component"
        )));
    }
    let joined = if collection_path.trim_end_matches('/').is_empty() {
        format!("/{segment}")
    } else {
        format!("{}/{segment}", collection_path.trim_end_matches('/'))
    };
    normalize_logical_path(&joined)
}

/// Returns the first segment of `candidate` below `parent`.
pub fn child_segment(parent: &str, candidate: &str) -> Option<String> {
    let parent = normalize_logical_path(parent).ok()?;
    let candidate = normalize_logical_path(candidate).ok()?;

    let remaining = if parent == ROOT {
        candidate.strip_prefix('/')?
    } else {
        candidate.strip_prefix(parent.as_str())?.strip_prefix('/')?
    };
    remaining
        .split('/')
        .next()
        .filter(|seg| !seg.is_empty())
        .map(str::to_string)
}

pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|seg| !seg.is_empty())
}

/// Whether `path` has as many segments as `pattern` and agrees with it on
/// every segment that is not `_`.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let mut pattern = split_segments(pattern);
    let mut path = split_segments(path);
    loop {
        match (pattern.next(), path.next()) {
            (None, None) => return true,
            (Some(expected), Some(actual)) => {
                if expected != WILDCARD_SEGMENT && expected != actual {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Splits a normalized non-root path into its parent path and last segment.
pub fn parent_and_base(path: &str) -> Option<(String, String)> {
    if path == ROOT {
        return None;
    }
    let (parent, base) = path.rsplit_once('/')?;
    if base.is_empty() {
        return None;
    }
    let parent = if parent.is_empty() { ROOT } else { parent };
    Some((parent.to_string(), base.to_string()))
}

#[derive(Clone, Copy)]
enum PathKind {
    Pattern,
    Concrete,
}

fn clean_absolute(input: &str, kind: PathKind) -> Result<String> {
    let s = input.trim().replace('\\', "/");
    if !s.starts_with('/') {
        return Err(validation("logical path must be absolute"));
    }
    if s.chars().any(|ch| ch.is_control()) {
        return Err(validation("logical path must not contain control characters"));
    }

    let mut out = Vec::<&str>::new();
    for seg in s.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            return Err(validation(
                "logical path must not contain traversal segments",
            ));
        }
        if seg == WILDCARD_SEGMENT && matches!(kind, PathKind::Concrete) {
            return Err(validation(
                "logical path must not contain reserved metadata segment \"_\"",
            ));
        }
        out.push(seg);
    }

    if out.is_empty() {
        return Ok(ROOT.to_string());
    }
    Ok(format!("/{}", out.join("/")))
}
