use super::{arg, Builtin, CommandError};
use crate::engine::Engine;
use crate::trash::{copy_dir_all, copy_file, move_path};
use chrono::{DateTime, Local};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_time(time: std::io::Result<SystemTime>) -> String {
    match time {
        Ok(t) => DateTime::<Local>::from(t)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => "unknown".to_string(),
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(unix)]
fn changed_time(meta: &fs::Metadata) -> std::io::Result<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    let secs = meta.ctime();
    let nanos = meta.ctime_nsec() as u32;
    let since_epoch = std::time::Duration::new(secs.unsigned_abs(), nanos);
    Ok(if secs >= 0 {
        SystemTime::UNIX_EPOCH + since_epoch
    } else {
        SystemTime::UNIX_EPOCH - since_epoch
    })
}

#[cfg(not(unix))]
fn changed_time(meta: &fs::Metadata) -> std::io::Result<SystemTime> {
    meta.created()
}

pub struct Stat;

impl Builtin for Stat {
    fn name(&self) -> &'static str {
        "stat"
    }

    fn usage(&self) -> &'static str {
        "stat <path>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let target = arg(args, 0, self.usage())?;
        let path = engine.resolve_existing(target)?;
        let meta = fs::metadata(&path).map_err(|e| CommandError::io("stat failed", e))?;

        let kind = if meta.is_dir() { "directory" } else { "file" };
        Ok(format!(
            "Path: {}\nType: {}\nSize: {} bytes\nPermissions (octal): {:#o}\nModified: {}\nAccessed: {}\nChanged: {}",
            path.display(),
            kind,
            meta.len(),
            permission_bits(&meta),
            format_time(meta.modified()),
            format_time(meta.accessed()),
            format_time(changed_time(&meta)),
        ))
    }
}

pub struct Cat;

impl Builtin for Cat {
    fn name(&self) -> &'static str {
        "cat"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["type", "read"]
    }

    fn usage(&self) -> &'static str {
        "cat <path>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let target = arg(args, 0, self.usage())?;
        let path = engine.resolve_file(target)?;
        let bytes = fs::read(&path).map_err(|e| CommandError::io("Could not read file", e))?;
        String::from_utf8(bytes).map_err(|_| {
            CommandError::Validation(format!(
                "Could not read file: {} is not valid UTF-8",
                file_name(&path)
            ))
        })
    }
}

/// Target path and the text formed by the remaining tokens joined by one space.
fn path_and_text(
    engine: &Engine,
    args: &[String],
    usage: &str,
) -> Result<(PathBuf, String), CommandError> {
    if args.len() < 2 {
        return Err(CommandError::usage(usage));
    }
    let path = engine.resolve(&args[0]);
    guard_trash(engine, &path, &args[0])?;
    if path.is_dir() {
        return Err(CommandError::WrongType(format!("Is a directory: {}", args[0])));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CommandError::io("Could not create parent", e))?;
    }
    Ok((path, args[1..].join(" ")))
}

pub struct Write;

impl Builtin for Write {
    fn name(&self) -> &'static str {
        "write"
    }

    fn usage(&self) -> &'static str {
        "write <path> <text...>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let (path, text) = path_and_text(engine, args, self.usage())?;
        fs::write(&path, text).map_err(|e| CommandError::io("Write failed", e))?;
        Ok(format!("Wrote {}", file_name(&path)))
    }
}

pub struct Append;

impl Builtin for Append {
    fn name(&self) -> &'static str {
        "append"
    }

    fn usage(&self) -> &'static str {
        "append <path> <text...>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let (path, text) = path_and_text(engine, args, self.usage())?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(text.as_bytes()))
            .map_err(|e| CommandError::io("Append failed", e))?;
        Ok(format!("Appended to {}", file_name(&path)))
    }
}

/// Refuse operations that would move or replace the sandbox root itself.
fn guard_root(engine: &Engine, path: &Path, input: &str) -> Result<(), CommandError> {
    if path == engine.root() {
        Err(CommandError::PermissionDenied(format!(
            "Refusing to operate on the sandbox root: {}",
            input
        )))
    } else {
        Ok(())
    }
}

/// The trash is only changed through rm, restore and empty-trash.
fn guard_trash(engine: &Engine, path: &Path, input: &str) -> Result<(), CommandError> {
    if engine.trash().holds(path) {
        Err(CommandError::PermissionDenied(format!(
            "Refusing to write into the trash: {}",
            input
        )))
    } else {
        Ok(())
    }
}

pub struct Mv;

impl Builtin for Mv {
    fn name(&self) -> &'static str {
        "mv"
    }

    fn usage(&self) -> &'static str {
        "mv <src> <dest>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let src_arg = arg(args, 0, self.usage())?;
        let dest_arg = arg(args, 1, self.usage())?;
        let src = engine.resolve_existing(src_arg)?;
        guard_root(engine, &src, src_arg)?;
        let dest = engine.resolve(dest_arg);

        let final_dest = if dest.is_dir() {
            dest.join(file_name(&src))
        } else {
            dest
        };
        guard_trash(engine, &final_dest, dest_arg)?;
        if final_dest.starts_with(&src) && final_dest != src {
            return Err(CommandError::Validation(format!(
                "Cannot move {} into itself",
                src_arg
            )));
        }
        if let Some(parent) = final_dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CommandError::io("Move failed", e))?;
        }
        move_path(&src, &final_dest).map_err(|e| CommandError::io("Move failed", e))?;
        Ok(format!(
            "Moved: {} -> {}",
            file_name(&src),
            engine.resolver().relative(&final_dest)
        ))
    }
}

pub struct Cp;

impl Builtin for Cp {
    fn name(&self) -> &'static str {
        "cp"
    }

    fn usage(&self) -> &'static str {
        "cp [-r] <src> <dest>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let mut recursive = false;
        let mut operands = Vec::new();
        for a in args {
            match a.as_str() {
                "-r" | "-R" | "--recursive" => recursive = true,
                flag if flag.starts_with('-') => {
                    return Err(CommandError::Validation(format!("cp: unknown option {}", flag)))
                }
                _ => operands.push(a.as_str()),
            }
        }
        let [src_arg, dest_arg] = operands[..] else {
            return Err(CommandError::usage(self.usage()));
        };

        let src = engine.resolve_existing(src_arg)?;
        let dest = engine.resolve(dest_arg);
        let final_dest = if dest.is_dir() {
            dest.join(file_name(&src))
        } else {
            dest
        };
        guard_trash(engine, &final_dest, dest_arg)?;

        if src.is_dir() {
            if !recursive {
                return Err(CommandError::WrongType(
                    "Source is a directory; use cp -r to copy directories".to_string(),
                ));
            }
            if final_dest.symlink_metadata().is_ok() {
                return Err(CommandError::Validation(format!(
                    "Destination already exists: {}",
                    engine.resolver().relative(&final_dest)
                )));
            }
            if final_dest.starts_with(&src) {
                return Err(CommandError::Validation(format!(
                    "Cannot copy {} into itself",
                    src_arg
                )));
            }
            copy_dir_all(&src, &final_dest).map_err(|e| CommandError::io("Copy failed", e))?;
            return Ok(format!(
                "Directory copied: {} -> {}",
                file_name(&src),
                engine.resolver().relative(&final_dest)
            ));
        }

        if final_dest == src {
            return Err(CommandError::Validation(format!(
                "{} and {} are the same file",
                src_arg, dest_arg
            )));
        }
        if let Some(parent) = final_dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CommandError::io("Copy failed", e))?;
        }
        copy_file(&src, &final_dest).map_err(|e| CommandError::io("Copy failed", e))?;
        Ok(format!(
            "Copied: {} -> {}",
            file_name(&src),
            engine.resolver().relative(&final_dest)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sandbox.root = dir.path().join("sb").display().to_string();
        (dir, Engine::new(&config).unwrap())
    }

    #[test]
    fn test_write_joins_tokens_with_single_space() {
        let (_dir, engine) = engine();
        let result = engine.execute("write f.txt hello    world");
        assert!(result.ok);
        assert_eq!(result.stdout, "Wrote f.txt");
        assert_eq!(
            fs::read_to_string(engine.root().join("f.txt")).unwrap(),
            "hello world"
        );
    }

    #[test]
    fn test_write_preserves_quoted_whitespace() {
        let (_dir, engine) = engine();
        engine.execute("write f.txt 'a  b'");
        assert_eq!(fs::read_to_string(engine.root().join("f.txt")).unwrap(), "a  b");
    }

    #[test]
    fn test_write_creates_parents() {
        let (_dir, engine) = engine();
        assert!(engine.execute("write a/b/c.txt deep").ok);
        assert_eq!(
            fs::read_to_string(engine.root().join("a/b/c.txt")).unwrap(),
            "deep"
        );
    }

    #[test]
    fn test_write_requires_text() {
        let (_dir, engine) = engine();
        let result = engine.execute("write f.txt");
        assert!(!result.ok);
        assert!(result.stderr.starts_with("Usage: write"));
    }

    #[test]
    fn test_write_to_directory_is_wrong_type() {
        let (_dir, engine) = engine();
        fs::create_dir(engine.root().join("d")).unwrap();
        let result = engine.execute("write d text");
        assert!(!result.ok);
        assert!(result.stderr.contains("Is a directory"));
    }

    #[test]
    fn test_append_has_no_implicit_newline() {
        let (_dir, engine) = engine();
        engine.execute("write log.txt one");
        let result = engine.execute("append log.txt two three");
        assert!(result.ok);
        assert_eq!(result.stdout, "Appended to log.txt");
        assert_eq!(
            fs::read_to_string(engine.root().join("log.txt")).unwrap(),
            "onetwo three"
        );
    }

    #[test]
    fn test_cat_aliases() {
        let (_dir, engine) = engine();
        engine.execute("write f.txt hi");
        for verb in ["cat", "type", "read", "CAT"] {
            let result = engine.execute(&format!("{} f.txt", verb));
            assert!(result.ok, "{}", verb);
            assert_eq!(result.stdout, "hi");
        }
    }

    #[test]
    fn test_cat_rejects_invalid_utf8() {
        let (_dir, engine) = engine();
        fs::write(engine.root().join("bin.dat"), [0xff, 0xfe, 0x00]).unwrap();
        let result = engine.execute("cat bin.dat");
        assert!(!result.ok);
        assert!(result.stderr.contains("not valid UTF-8"));
    }

    #[test]
    fn test_cat_missing_and_directory() {
        let (_dir, engine) = engine();
        assert_eq!(engine.execute("cat nope.txt").stderr, "File not found: nope.txt");
        fs::create_dir(engine.root().join("d")).unwrap();
        assert_eq!(engine.execute("cat d").stderr, "Not a regular file: d");
        assert!(engine.execute("cat").stderr.starts_with("Usage: cat"));
    }

    #[test]
    fn test_stat_file() {
        let (_dir, engine) = engine();
        engine.execute("write f.txt 12345");
        let result = engine.execute("stat f.txt");
        assert!(result.ok);
        assert!(result.stdout.contains("Type: file"));
        assert!(result.stdout.contains("Size: 5 bytes"));
        assert!(result.stdout.contains("Permissions (octal): 0o"));
        assert!(result.stdout.contains("Modified: "));
        assert!(result.stdout.contains("Changed: "));
    }

    #[test]
    fn test_stat_directory_and_missing() {
        let (_dir, engine) = engine();
        fs::create_dir(engine.root().join("d")).unwrap();
        assert!(engine.execute("stat d").stdout.contains("Type: directory"));
        let result = engine.execute("stat ghost");
        assert!(!result.ok);
        assert_eq!(result.stderr, "File not found: ghost");
    }

    #[test]
    fn test_mv_rename() {
        let (_dir, engine) = engine();
        engine.execute("write a.txt data");
        let result = engine.execute("mv a.txt sub/b.txt");
        assert!(result.ok, "{:?}", result);
        assert!(!engine.root().join("a.txt").exists());
        assert_eq!(
            fs::read_to_string(engine.root().join("sub/b.txt")).unwrap(),
            "data"
        );
    }

    #[test]
    fn test_mv_into_existing_directory() {
        let (_dir, engine) = engine();
        engine.execute("write a.txt data");
        fs::create_dir(engine.root().join("box")).unwrap();
        assert!(engine.execute("mv a.txt box").ok);
        assert!(engine.root().join("box/a.txt").is_file());
    }

    #[test]
    fn test_mv_missing_source() {
        let (_dir, engine) = engine();
        let result = engine.execute("mv ghost.txt x.txt");
        assert!(!result.ok);
        assert_eq!(result.stderr, "File not found: ghost.txt");
    }

    #[test]
    fn test_mv_directory_into_itself_rejected() {
        let (_dir, engine) = engine();
        fs::create_dir_all(engine.root().join("a/b")).unwrap();
        let result = engine.execute("mv a a/b");
        assert!(!result.ok);
        assert!(engine.root().join("a/b").is_dir());
    }

    #[test]
    fn test_cp_file_into_directory() {
        let (_dir, engine) = engine();
        engine.execute("write a.txt data");
        fs::create_dir(engine.root().join("box")).unwrap();
        let result = engine.execute("cp a.txt box");
        assert!(result.ok);
        assert_eq!(
            fs::read_to_string(engine.root().join("box/a.txt")).unwrap(),
            "data"
        );
        assert!(engine.root().join("a.txt").exists());
    }

    #[test]
    fn test_cp_preserves_mtime() {
        let (_dir, engine) = engine();
        engine.execute("write a.txt data");
        let old = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000_000);
        fs::OpenOptions::new()
            .write(true)
            .open(engine.root().join("a.txt"))
            .unwrap()
            .set_modified(old)
            .unwrap();
        assert!(engine.execute("cp a.txt b.txt").ok);
        let copied = fs::metadata(engine.root().join("b.txt")).unwrap();
        assert_eq!(copied.modified().unwrap(), old);
    }

    #[test]
    fn test_cp_directory_requires_recursive() {
        let (_dir, engine) = engine();
        fs::create_dir(engine.root().join("d")).unwrap();
        let result = engine.execute("cp d e");
        assert!(!result.ok);
        assert!(result.stderr.contains("use cp -r"));
    }

    #[test]
    fn test_cp_recursive_refuses_existing_destination() {
        let (_dir, engine) = engine();
        fs::create_dir_all(engine.root().join("d/inner")).unwrap();
        fs::write(engine.root().join("d/inner/x.txt"), "x").unwrap();

        assert!(engine.execute("cp -r d e").ok);
        assert_eq!(fs::read_to_string(engine.root().join("e/inner/x.txt")).unwrap(), "x");

        fs::create_dir_all(engine.root().join("f/d")).unwrap();
        let result = engine.execute("cp -r d f");
        assert!(!result.ok);
        assert!(result.stderr.starts_with("Destination already exists"));
    }

    #[test]
    fn test_cp_into_itself_rejected() {
        let (_dir, engine) = engine();
        fs::create_dir_all(engine.root().join("d")).unwrap();
        let result = engine.execute("cp -r d d/copy");
        assert!(!result.ok);
        assert!(result.stderr.contains("into itself"));
    }

    #[test]
    fn test_destinations_inside_trash_refused() {
        let (_dir, engine) = engine();
        engine.execute("write a.txt keep");
        engine.execute("rm a.txt");
        engine.execute("write b.txt other");

        for line in [
            "write .trash/a.txt clobbered",
            "append .trash/a.txt more",
            "cp b.txt .trash/a.txt",
            "mv b.txt .trash/a.txt",
            "mv b.txt .trash",
        ] {
            let result = engine.execute(line);
            assert!(!result.ok, "{}: {:?}", line, result);
            assert!(result.stderr.starts_with("Refusing to write into the trash"));
        }
        assert_eq!(
            fs::read_to_string(engine.trash().dir().join("a.txt")).unwrap(),
            "keep"
        );
        assert!(engine.root().join("b.txt").is_file());
        assert_eq!(engine.trash().entries(), vec!["a.txt"]);
    }
}
