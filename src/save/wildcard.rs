use std::collections::BTreeSet;

use restsync_core::path::{ROOT, WILDCARD_SEGMENT, child_segment, join_logical_path, split_segments};
use restsync_core::{Error, Result};

use super::SaveEngine;
use crate::store::ListPolicy;

impl SaveEngine<'_> {
    /// Expands `_` segments against live remote listings, one level at a time.
    ///
    /// Each generation is sorted, so targets come back in a stable order.
    pub fn expand_wildcard_paths(&mut self, pattern: &str) -> Result<Vec<String>> {
        let segments: Vec<String> = split_segments(pattern).map(str::to_string).collect();
        if segments.is_empty() {
            return Err(Error::Validation(
                "wildcard save path must target a collection or resource".to_string(),
            ));
        }

        let mut current = vec![ROOT.to_string()];
        for segment in &segments {
            let mut next = BTreeSet::new();
            if segment == WILDCARD_SEGMENT {
                for parent in &current {
                    let items = self.remote_list(parent, ListPolicy { recursive: false })?;
                    for item in items {
                        let Some(child) = child_segment(parent, &item.logical_path) else {
                            continue;
                        };
                        next.insert(join_logical_path(parent, &child)?);
                    }
                }
            } else {
                for parent in &current {
                    next.insert(join_logical_path(parent, segment)?);
                }
            }

            if next.is_empty() {
                return Err(Error::NotFound(format!(
                    "no remote resources matched wildcard path {pattern:?}"
                )));
            }
            tracing::debug!(segment = %segment, matched = next.len(), "expanded wildcard segment");
            current = next.into_iter().collect();
        }
        Ok(current)
    }
}
