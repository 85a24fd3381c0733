use super::{count_value, Builtin, CommandError};
use crate::engine::Engine;
use std::cmp::Ordering;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

const FIND_DEFAULT_DEPTH: usize = 4;
const TREE_DEFAULT_DEPTH: usize = 3;
const UNREADABLE: &str = "[permission denied or unreadable]";

/// Walker rooted at `start` that never descends into the trash area,
/// unless the walk starts there.
fn walker(
    start: &Path,
    trash: &Path,
    max_depth: usize,
) -> walkdir::FilterEntry<walkdir::IntoIter, impl FnMut(&DirEntry) -> bool> {
    let trash = trash.to_path_buf();
    WalkDir::new(start)
        .max_depth(max_depth)
        .sort_by(tree_order)
        .into_iter()
        .filter_entry(move |e| e.depth() == 0 || e.path() != trash)
}

/// Directories before files, then case-insensitive by name.
fn tree_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    let a_dir = a.file_type().is_dir();
    let b_dir = b.file_type().is_dir();
    b_dir.cmp(&a_dir).then_with(|| {
        a.file_name()
            .to_string_lossy()
            .to_lowercase()
            .cmp(&b.file_name().to_string_lossy().to_lowercase())
    })
}

pub struct Find;

impl Builtin for Find {
    fn name(&self) -> &'static str {
        "find"
    }

    fn usage(&self) -> &'static str {
        "find [path] [-maxdepth N] [-name substr]"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let mut start = ".";
        let mut max_depth = FIND_DEFAULT_DEPTH;
        let mut name_filter: Option<&str> = None;
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-maxdepth" => {
                    max_depth = count_value("-maxdepth", args.get(i + 1))?;
                    i += 1;
                }
                "-name" => {
                    let value = args.get(i + 1).ok_or_else(|| CommandError::usage(self.usage()))?;
                    name_filter = Some(value.as_str());
                    i += 1;
                }
                flag if flag.starts_with('-') => {
                    return Err(CommandError::Validation(format!("find: unknown option {}", flag)))
                }
                path => start = path,
            }
            i += 1;
        }

        let start = engine.resolve_existing(start)?;
        let mut found: Vec<String> = walker(&start, engine.trash().dir(), max_depth)
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                name_filter.map_or(true, |needle| e.file_name().to_string_lossy().contains(needle))
            })
            .map(|e| engine.resolver().relative(e.path()).into_owned())
            .collect();
        found.sort();
        Ok(found.join("\n"))
    }
}

pub struct Tree;

impl Builtin for Tree {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn usage(&self) -> &'static str {
        "tree [path] [-L depth]"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let mut start = ".";
        let mut depth = TREE_DEFAULT_DEPTH;
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-L" => {
                    depth = count_value("-L", args.get(i + 1))?;
                    i += 1;
                }
                flag if flag.starts_with('-') => {
                    return Err(CommandError::Validation(format!("tree: unknown option {}", flag)))
                }
                path => start = path,
            }
            i += 1;
        }

        let target = engine.resolve_existing(start)?;
        if !target.is_dir() {
            return Err(CommandError::WrongType(format!("Not a directory: {}", start)));
        }

        let mut lines = vec![format!("{}/", engine.resolver().relative(&target))];
        for entry in walker(&target, engine.trash().dir(), depth) {
            match entry {
                Ok(e) if e.depth() == 0 => {}
                Ok(e) => {
                    let suffix = if e.file_type().is_dir() { "/" } else { "" };
                    lines.push(format!(
                        "{}{}{}",
                        indent(e.depth()),
                        e.file_name().to_string_lossy(),
                        suffix
                    ));
                }
                Err(e) => {
                    tracing::debug!("tree: {}", e);
                    lines.push(format!("{}{}", indent(e.depth() + 1), UNREADABLE));
                }
            }
        }
        Ok(lines.join("\n"))
    }
}

fn indent(depth: usize) -> String {
    format!("{}└─ ", "  ".repeat(depth.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sandbox.root = dir.path().join("sb").display().to_string();
        let engine = Engine::new(&config).unwrap();
        let root = engine.root();
        fs::create_dir_all(root.join("src/deep/deeper/deepest")).unwrap();
        fs::write(root.join("README.md"), "r").unwrap();
        fs::write(root.join("src/main.rs"), "m").unwrap();
        fs::write(root.join("src/Lib.rs"), "l").unwrap();
        fs::write(root.join("src/deep/deeper/deepest/bottom.rs"), "b").unwrap();
        (dir, engine)
    }

    #[test]
    fn test_find_lists_files_relative_to_root() {
        let (_dir, engine) = engine();
        let result = engine.execute("find");
        assert!(result.ok);
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert!(lines.contains(&"README.md"));
        assert!(lines.contains(&"src/main.rs"));
        assert!(lines.contains(&"src/deep/deeper/deepest/bottom.rs"));
    }

    #[test]
    fn test_find_from_subdirectory_stays_root_relative() {
        let (_dir, engine) = engine();
        engine.execute("cd src");
        let result = engine.execute("find . -name main");
        assert_eq!(result.stdout, "src/main.rs");
    }

    #[test]
    fn test_find_maxdepth_prunes() {
        let (_dir, engine) = engine();
        let result = engine.execute("find . -maxdepth 2");
        assert!(!result.stdout.contains("bottom.rs"));
        assert!(result.stdout.contains("src/main.rs"));
        let result = engine.execute("find . -maxdepth 1");
        assert_eq!(result.stdout, "README.md");
    }

    #[test]
    fn test_find_never_leaves_root() {
        let (_dir, engine) = engine();
        let result = engine.execute("find ../../.. -name README");
        assert_eq!(result.stdout, "README.md");
    }

    #[test]
    fn test_find_skips_trash() {
        let (_dir, engine) = engine();
        engine.execute("rm README.md");
        assert_eq!(engine.trash().entries(), vec!["README.md"]);
        assert_eq!(engine.execute("find . -name README").stdout, "");
    }

    #[test]
    fn test_find_missing_start() {
        let (_dir, engine) = engine();
        assert!(!engine.execute("find nowhere").ok);
        assert!(!engine.execute("find -maxdepth x").ok);
    }

    #[test]
    fn test_tree_orders_dirs_first_case_insensitive() {
        let (_dir, engine) = engine();
        let result = engine.execute("tree src -L 1");
        assert!(result.ok, "{:?}", result);
        assert_eq!(
            result.stdout,
            "src/\n└─ deep/\n└─ Lib.rs\n└─ main.rs"
        );
    }

    #[test]
    fn test_tree_default_depth() {
        let (_dir, engine) = engine();
        let out = engine.execute("tree").stdout;
        assert!(out.starts_with("./\n"));
        assert!(out.contains("    └─ deeper/"));
        assert!(!out.contains("deepest"));
    }

    #[test]
    fn test_tree_on_file_is_wrong_type() {
        let (_dir, engine) = engine();
        let result = engine.execute("tree README.md");
        assert!(!result.ok);
        assert_eq!(result.stderr, "Not a directory: README.md");
    }
}
