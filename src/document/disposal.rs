//! Deletion of owned temporary files.
//!
//! Files that cannot be deleted right away (still open elsewhere, permission
//! hiccup on a network temp dir) are queued and retried by
//! [`DisposalManager::purge_deferred`], which also runs when the manager is
//! dropped at process exit.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use super::content::BackingFile;

/// Deletes owned temporary files and remembers the ones it could not delete.
#[derive(Debug, Default)]
pub struct DisposalManager {
    deferred: Mutex<Vec<PathBuf>>,
}

impl DisposalManager {
    /// Creates a manager with an empty deferred list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes `file` if it is owned-temporary; caller files are never touched.
    ///
    /// Returns `false` when deletion failed and the path was deferred.
    pub fn release(&self, file: &BackingFile) -> bool {
        if !file.temporary {
            return true;
        }
        debug!(path = %file.path.display(), "deleting temporary file");
        match remove(&file.path) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    path = %file.path.display(),
                    error = %e,
                    "deleting temporary file failed, deferring until exit"
                );
                self.lock().push(file.path.clone());
                false
            }
        }
    }

    /// Returns the paths still waiting for deletion.
    #[must_use]
    pub fn deferred(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Retries all deferred deletions; returns how many remain.
    pub fn purge_deferred(&self) -> usize {
        let mut deferred = self.lock();
        deferred.retain(|path| match remove(path) {
            Ok(()) => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "temporary file still not deletable");
                true
            }
        });
        deferred.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DisposalManager {
    fn drop(&mut self) {
        let remaining = self.purge_deferred();
        if remaining > 0 {
            warn!(remaining, "temporary files left behind at exit");
        }
    }
}

/// Removes `path`; an already missing file counts as removed.
fn remove(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
