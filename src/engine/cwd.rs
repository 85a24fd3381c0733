use crate::commands::CommandError;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// The engine's current directory, always an existing directory under the root.
pub struct WorkingDir {
    root: PathBuf,
    current: Mutex<PathBuf>,
}

impl WorkingDir {
    pub fn new(root: PathBuf) -> Self {
        Self {
            current: Mutex::new(root.clone()),
            root,
        }
    }

    pub fn get(&self) -> PathBuf {
        self.lock().clone()
    }

    /// Run `f` with the current directory held, so no `cd` interleaves.
    pub fn with<R>(&self, f: impl FnOnce(&Path) -> R) -> R {
        let current = self.lock();
        f(&current)
    }

    /// Compute a new directory from the current one and switch to it, all
    /// under the lock. On error the current directory is left unchanged.
    pub fn change(
        &self,
        f: impl FnOnce(&Path) -> Result<PathBuf, CommandError>,
    ) -> Result<PathBuf, CommandError> {
        let mut current = self.lock();
        let next = f(&current)?;
        *current = next.clone();
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, PathBuf> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if !current.is_dir() {
            tracing::warn!(
                "working directory {} vanished, resetting to sandbox root",
                current.display()
            );
            *current = self.root.clone();
        }
        current
    }
}
