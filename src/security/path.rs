use std::io;
use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving `.` and `..` components without touching the filesystem.
/// Unlike `canonicalize()`, this works even if the path doesn't exist.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {} // skip "."
            Component::ParentDir => {
                // Pop the last component if possible
                if let Some(last) = components.last() {
                    match last {
                        Component::RootDir | Component::Prefix(_) => {} // can't go above root
                        Component::ParentDir => {
                            components.push(component);
                        }
                        _ => {
                            components.pop();
                        }
                    }
                } else {
                    components.push(component);
                }
            }
            _ => {
                components.push(component);
            }
        }
    }

    let mut result = PathBuf::new();
    for c in &components {
        result.push(c.as_os_str());
    }
    if result.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        result
    }
}

/// Canonicalize the longest existing ancestor of `path` (resolving symlinks)
/// and re-append the components that do not exist yet.
///
/// `path` must already be normalized. Returns `None` when an existing entry
/// cannot be canonicalized, e.g. a dangling symlink.
fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if existing.symlink_metadata().is_ok() {
            let base = std::fs::canonicalize(existing).ok()?;
            return Some(tail.iter().rev().fold(base, |acc, name| acc.join(name)));
        }
        tail.push(existing.file_name()?);
        existing = existing.parent()?;
    }
}

/// Maps user-supplied path strings onto paths inside a sandbox root.
///
/// Every path returned by [`PathResolver::resolve`] is a descendant of (or
/// equal to) the canonical root, including after symlink resolution of the
/// parts of the path that exist.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create the root (idempotently) and remember its canonical form.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `input` relative to `base`, confined to the root.
    ///
    /// Absolute inputs are re-rooted under the sandbox root. Anything that
    /// escapes collapses to `root/<basename of input>`, or to the root itself
    /// when the input has no usable basename or the basename escapes too.
    pub fn resolve(&self, input: &str, base: &Path) -> PathBuf {
        let raw = Path::new(input);
        let candidate = if raw.has_root() {
            let relative: PathBuf = raw
                .components()
                .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
                .collect();
            self.root.join(relative)
        } else {
            base.join(raw)
        };

        if let Some(confined) = self.confine(&candidate) {
            return confined;
        }

        tracing::debug!(input, "path escapes sandbox, falling back to basename");
        raw.file_name()
            .and_then(|name| self.confine(&self.root.join(name)))
            .unwrap_or_else(|| self.root.clone())
    }

    /// Whether `path` lies inside the root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Render `path` relative to the root, `.` for the root itself.
    pub fn relative<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".into(),
            Ok(rel) => rel.to_string_lossy(),
            Err(_) => path.to_string_lossy(),
        }
    }

    fn confine(&self, candidate: &Path) -> Option<PathBuf> {
        let real = canonicalize_lenient(&normalize_path(candidate))?;
        self.contains(&real).then_some(real)
    }
}
