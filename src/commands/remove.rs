use super::{arg, Builtin, CommandError};
use crate::engine::Engine;
use std::fs;

const CONFIRM_FLAG: &str = "--yes-i-know";

#[derive(Default)]
struct RmOptions<'a> {
    recursive: bool,
    permanent: bool,
    confirmed: bool,
    targets: Vec<&'a str>,
}

fn parse_rm_args(args: &[String]) -> Result<RmOptions<'_>, CommandError> {
    let mut opts = RmOptions::default();
    for a in args {
        match a.as_str() {
            "-r" | "-R" | "--recursive" => opts.recursive = true,
            "--permanent" => opts.permanent = true,
            CONFIRM_FLAG => opts.confirmed = true,
            flag if flag.starts_with('-') => {
                return Err(CommandError::Validation(format!("rm: unknown option {}", flag)))
            }
            target => opts.targets.push(target),
        }
    }
    Ok(opts)
}

pub struct Rm;

impl Rm {
    fn remove_one(&self, engine: &Engine, target: &str, opts: &RmOptions) -> Result<String, CommandError> {
        let path = engine.resolve(target);
        if path == engine.root() {
            return Err(CommandError::PermissionDenied(format!(
                "{}: refusing to remove the sandbox root",
                target
            )));
        }
        if engine.trash().holds(&path) {
            return Err(CommandError::PermissionDenied(format!(
                "{}: refusing to remove trash contents (use empty-trash)",
                target
            )));
        }
        let meta = fs::symlink_metadata(&path)
            .map_err(|_| CommandError::NotFound(format!("{}: not found", target)))?;
        if meta.is_dir() && !opts.recursive && !opts.permanent {
            return Err(CommandError::WrongType(format!("{}: is a directory (use -r)", target)));
        }

        if !opts.permanent {
            return engine.trash().move_to_trash(&path).map_err(CommandError::Internal);
        }

        let removed = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| CommandError::io(&format!("{}: delete failed", target), e))?;
        tracing::info!("permanently deleted {}", path.display());
        Ok(format!("Deleted permanently: {}", target))
    }
}

impl Builtin for Rm {
    fn name(&self) -> &'static str {
        "rm"
    }

    fn usage(&self) -> &'static str {
        "rm [-r|--recursive] [--permanent --yes-i-know] <target...>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let opts = parse_rm_args(args)?;
        if opts.targets.is_empty() {
            return Err(CommandError::usage(self.usage()));
        }
        if opts.permanent && !opts.confirmed {
            return Err(CommandError::ConfirmationRequired(format!(
                "Permanent delete requires --permanent {}",
                CONFIRM_FLAG
            )));
        }

        if let [target] = opts.targets[..] {
            return self.remove_one(engine, target, &opts);
        }

        // With several targets, per-target failures are reported inline and
        // the batch itself succeeds.
        let lines: Vec<String> = opts
            .targets
            .iter()
            .map(|target| {
                self.remove_one(engine, target, &opts)
                    .unwrap_or_else(|e| e.to_string())
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

pub struct Restore;

impl Builtin for Restore {
    fn name(&self) -> &'static str {
        "restore"
    }

    fn usage(&self) -> &'static str {
        "restore <name>"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let name = arg(args, 0, self.usage())?;
        engine.trash().restore(name, &engine.cwd())
    }
}

pub struct EmptyTrash;

impl Builtin for EmptyTrash {
    fn name(&self) -> &'static str {
        "empty-trash"
    }

    fn usage(&self) -> &'static str {
        "empty-trash --yes-i-know"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        if !args.iter().any(|a| a == CONFIRM_FLAG) {
            return Err(CommandError::ConfirmationRequired(format!(
                "empty-trash requires {}",
                CONFIRM_FLAG
            )));
        }
        Ok(engine.trash().empty())
    }
}
