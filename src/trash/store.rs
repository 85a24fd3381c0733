use super::{free_name, move_path};
use crate::commands::CommandError;
use std::fs;
use std::path::{Path, PathBuf};

/// Reversible delete area living under the sandbox root.
///
/// Entries are plain files or directories; collisions are resolved by
/// renaming, never by overwriting.
pub struct TrashStore {
    dir: PathBuf,
}

impl TrashStore {
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            dir: root.join(name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True for the trash directory itself and anything below it.
    pub fn holds(&self, path: &Path) -> bool {
        path.starts_with(&self.dir)
    }

    /// Move `target` into the trash. Both outcomes are a message for the
    /// user; nothing is raised.
    pub fn move_to_trash(&self, target: &Path) -> Result<String, String> {
        let display_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.display().to_string());

        if let Err(e) = fs::create_dir_all(&self.dir) {
            return Err(format!("{}: move to trash failed: {}", display_name, e));
        }

        let dest = free_name(&self.dir, &display_name, "_");
        match move_path(target, &dest) {
            Ok(()) => {
                let entry = entry_name(&dest);
                tracing::debug!("trashed {} as {}", target.display(), entry);
                Ok(format!("Moved to trash: {} -> {}", display_name, entry))
            }
            Err(e) => Err(format!("{}: move to trash failed: {}", display_name, e)),
        }
    }

    /// Move the entry `name` back into `dest_dir`, renaming on collision.
    pub fn restore(&self, name: &str, dest_dir: &Path) -> Result<String, CommandError> {
        // Only bare entry names; anything else could address outside the trash.
        let is_entry_name = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        let src = self.dir.join(name);
        if !is_entry_name || src.symlink_metadata().is_err() {
            return Err(CommandError::NotFound(format!("{}: not found in trash", name)));
        }

        let dest = free_name(dest_dir, name, "_restored_");
        move_path(&src, &dest).map_err(|e| CommandError::io("Restore failed", e))?;
        tracing::debug!("restored {} to {}", name, dest.display());
        Ok(format!("Restored: {} -> {}", name, entry_name(&dest)))
    }

    /// Remove every entry, ignoring individual failures.
    pub fn empty(&self) -> String {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return "Trash is already empty.".to_string(),
        };

        let mut removed = 0usize;
        let mut failed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = match entry.file_type() {
                Ok(ft) if ft.is_dir() => fs::remove_dir_all(&path),
                _ => fs::remove_file(&path),
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!("could not remove trash entry {}: {}", path.display(), e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            format!("Trash emptied ({} removed, {} skipped).", removed, failed)
        } else {
            format!("Trash emptied ({} removed).", removed)
        }
    }

    /// Entry names currently held, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .map(|rd| {
                rd.flatten()
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TrashStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TrashStore::new(dir.path(), ".trash");
        (dir, store)
    }

    #[test]
    fn test_trash_created_lazily() {
        let (dir, store) = store();
        assert!(!store.dir().exists());
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let msg = store.move_to_trash(&file).unwrap();
        assert_eq!(msg, "Moved to trash: a.txt -> a.txt");
        assert!(store.dir().is_dir());
        assert!(!file.exists());
    }

    #[test]
    fn test_collisions_get_counter_suffix() {
        let (dir, store) = store();
        for content in ["one", "two", "three"] {
            let file = dir.path().join("f.txt");
            fs::write(&file, content).unwrap();
            store.move_to_trash(&file).unwrap();
        }
        assert_eq!(store.entries(), vec!["f.txt", "f_1.txt", "f_2.txt"]);
        assert_eq!(fs::read_to_string(store.dir().join("f_1.txt")).unwrap(), "two");
    }

    #[test]
    fn test_move_missing_reports_failure() {
        let (dir, store) = store();
        let msg = store.move_to_trash(&dir.path().join("ghost.txt")).unwrap_err();
        assert!(msg.starts_with("ghost.txt: move to trash failed"));
    }

    #[test]
    fn test_restore_round_trip() {
        let (dir, store) = store();
        let file = dir.path().join("notes.md");
        fs::write(&file, "keep me").unwrap();
        store.move_to_trash(&file).unwrap();

        let msg = store.restore("notes.md", dir.path()).unwrap();
        assert_eq!(msg, "Restored: notes.md -> notes.md");
        assert_eq!(fs::read_to_string(&file).unwrap(), "keep me");
    }

    #[test]
    fn test_restore_collision_renames() {
        let (dir, store) = store();
        let file = dir.path().join("notes.md");
        fs::write(&file, "old").unwrap();
        store.move_to_trash(&file).unwrap();
        fs::write(&file, "new").unwrap();

        let msg = store.restore("notes.md", dir.path()).unwrap();
        assert_eq!(msg, "Restored: notes.md -> notes_restored_1.md");
        assert_eq!(fs::read_to_string(&file).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(dir.path().join("notes_restored_1.md")).unwrap(),
            "old"
        );
    }

    #[test]
    fn test_restore_missing_is_not_found() {
        let (dir, store) = store();
        let err = store.restore("nope.txt", dir.path()).unwrap_err();
        assert!(matches!(err, CommandError::NotFound(_)));
    }

    #[test]
    fn test_restore_rejects_path_names() {
        let (dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(dir.path().join("outside.txt"), "x").unwrap();
        let err = store.restore("../outside.txt", dir.path()).unwrap_err();
        assert!(matches!(err, CommandError::NotFound(_)));
    }

    #[test]
    fn test_empty_removes_files_and_dirs() {
        let (dir, store) = store();
        let sub = dir.path().join("sub");
        fs::create_dir_all(sub.join("deep")).unwrap();
        fs::write(sub.join("deep").join("x"), "x").unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "f").unwrap();
        store.move_to_trash(&sub).unwrap();
        store.move_to_trash(&file).unwrap();

        assert_eq!(store.empty(), "Trash emptied (2 removed).");
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_empty_without_trash_dir() {
        let (_dir, store) = store();
        assert_eq!(store.empty(), "Trash is already empty.");
    }
}
