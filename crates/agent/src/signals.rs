//! Cleanup of in-flight temporary directories on SIGINT/SIGTERM
//!
//! A run registers its scratch directory for as long as it exists. If the
//! process is interrupted, the signal thread removes every registered
//! directory and exits with status 130. Nothing at the CA is rolled back;
//! the next run picks up from the CA's state.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Exit status after an interrupt
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Directories to remove if the process is interrupted
#[derive(Debug, Clone, Default)]
pub struct CleanupRegistry {
    dirs: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dir` until the returned guard is dropped
    pub fn register(&self, dir: &Path) -> CleanupGuard {
        trace!(dir = %dir.display(), "Registered for cleanup");
        self.dirs.lock().insert(dir.to_path_buf());
        CleanupGuard {
            registry: self.clone(),
            dir: dir.to_path_buf(),
        }
    }

    pub fn pending(&self) -> Vec<PathBuf> {
        self.dirs.lock().iter().cloned().collect()
    }

    /// Remove every registered directory; returns how many were removed
    pub fn cleanup_all(&self) -> usize {
        let dirs = std::mem::take(&mut *self.dirs.lock());
        let mut removed = 0;
        for dir in dirs {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove temporary directory"),
            }
        }
        debug!(removed, "Cleaned up temporary directories");
        removed
    }

    /// Spawn the signal thread
    pub fn install(&self) -> std::io::Result<()> {
        use signal_hook::consts::signal::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let registry = self.clone();

        std::thread::Builder::new()
            .name("certsmith-signals".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    warn!(signal, "Interrupted, removing temporary state");
                    registry.cleanup_all();
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            })?;

        debug!("Signal handlers installed");
        Ok(())
    }
}

/// Unregisters its directory when dropped
#[derive(Debug)]
pub struct CleanupGuard {
    registry: CleanupRegistry,
    dir: PathBuf,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.dirs.lock().remove(&self.dir);
    }
}
