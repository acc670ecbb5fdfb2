use restsync_core::{Error, Result};

use super::{SaveEngine, SaveEntry};

impl SaveEngine<'_> {
    pub(super) fn ensure_target_allowed(&mut self, logical_path: &str, force: bool) -> Result<()> {
        if force {
            return Ok(());
        }
        match self.store_get(logical_path) {
            Ok(_) => Err(Error::Validation(format!(
                "resource {logical_path:?} already exists; rerun with --overwrite to overwrite"
            ))),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Checks entries in order and stops at the first one that may not be written.
    pub(super) fn ensure_entries_writable(
        &mut self,
        entries: &[SaveEntry],
        force: bool,
    ) -> Result<()> {
        if force {
            return Ok(());
        }
        for entry in entries {
            self.ensure_target_allowed(&entry.logical_path, false)?;
        }
        Ok(())
    }
}
