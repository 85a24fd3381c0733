pub mod store;

pub use store::TrashStore;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Move `src` to `dest`, renaming where possible and falling back to
/// copy-then-delete when the rename crosses a filesystem boundary.
pub fn move_path(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                "rename {} -> {} failed ({}), copying instead",
                src.display(),
                dest.display(),
                rename_err
            );
            let meta = fs::symlink_metadata(src)?;
            if meta.is_dir() {
                copy_dir_all(src, dest)?;
                fs::remove_dir_all(src)
            } else {
                copy_file(src, dest)?;
                fs::remove_file(src)
            }
        }
    }
}

/// Copy a file, carrying over permissions and the modification time.
pub fn copy_file(src: &Path, dest: &Path) -> io::Result<u64> {
    let copied = fs::copy(src, dest)?;
    if let Ok(modified) = fs::metadata(src).and_then(|m| m.modified()) {
        if let Ok(file) = fs::OpenOptions::new().write(true).open(dest) {
            let _ = file.set_modified(modified);
        }
    }
    Ok(copied)
}

/// Recursively copy a directory tree.
pub fn copy_dir_all(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

/// First name in `dir` that does not exist yet: `name` itself, then
/// `<stem><infix><n><suffix>` for n = 1, 2, ...
pub(crate) fn free_name(dir: &Path, name: &str, infix: &str) -> PathBuf {
    let first = dir.join(name);
    if first.symlink_metadata().is_err() {
        return first;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let suffix = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{}{}{}{}", stem, infix, n, suffix));
        if candidate.symlink_metadata().is_err() {
            return candidate;
        }
        n += 1;
    }
}
