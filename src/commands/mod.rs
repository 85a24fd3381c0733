pub mod files;
pub mod hash;
pub mod nav;
pub mod remove;
pub mod stats;
pub mod text;
pub mod walk;

use crate::engine::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use thiserror::Error;

/// Every verb a client may use, aliases included.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "ls", "dir", "pwd", "cat", "type", "read", "echo", "mkdir", "rmdir", "touch", "stat",
    "whoami", "uname", "df", "du", "ps", "stats", "help", "cd", "write", "append", "rm", "mv",
    "cp", "restore", "empty-trash", "head", "tail", "grep", "find", "tree", "wc", "md5",
    "sha256",
];

/// Allowed verbs without built-in logic; they run as native processes.
pub const NATIVE_COMMANDS: &[&str] = &[
    "ls", "mkdir", "rmdir", "echo", "touch", "whoami", "uname", "df", "du",
];

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),
    #[error("Command '{0}' not allowed.")]
    NotAllowed(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    WrongType(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    ConfirmationRequired(String),
    #[error("Process killed due to timeout ({0}s).")]
    Timeout(u64),
    #[error("{0}")]
    Internal(String),
}

impl CommandError {
    /// Classify a filesystem error, prefixing it with `context`.
    pub fn io(context: &str, err: io::Error) -> Self {
        let msg = format!("{}: {}", context, err);
        match err.kind() {
            io::ErrorKind::NotFound => CommandError::NotFound(msg),
            io::ErrorKind::PermissionDenied => CommandError::PermissionDenied(msg),
            _ => CommandError::Internal(msg),
        }
    }

    pub fn usage(usage: &str) -> Self {
        CommandError::Validation(format!("Usage: {}", usage))
    }
}

/// The universal return shape of every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            ok: true,
            stdout: stdout.into(),
            stderr: String::new(),
            rc: None,
        }
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: stderr.into(),
            rc: None,
        }
    }

    pub fn error(err: CommandError) -> Self {
        Self::failure(err.to_string())
    }
}

impl From<Result<String, CommandError>> for CommandResult {
    fn from(result: Result<String, CommandError>) -> Self {
        match result {
            Ok(stdout) => Self::success(stdout),
            Err(e) => Self::error(e),
        }
    }
}

/// A whitelisted verb with dedicated interpreter logic.
pub trait Builtin: Send + Sync {
    fn name(&self) -> &'static str;
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }
    fn usage(&self) -> &'static str;
    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError>;
}

/// Dispatch table from canonical verb to handler, with aliases resolved up front.
pub struct CommandRegistry {
    builtins: HashMap<&'static str, Box<dyn Builtin>>,
    aliases: HashMap<&'static str, &'static str>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            builtins: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn register(&mut self, builtin: Box<dyn Builtin>) {
        for &alias in builtin.aliases() {
            self.aliases.insert(alias, builtin.name());
        }
        self.builtins.insert(builtin.name(), builtin);
    }

    pub fn alias(&mut self, alias: &'static str, canonical: &'static str) {
        self.aliases.insert(alias, canonical);
    }

    /// The canonical verb for `verb`; unknown verbs map to themselves.
    pub fn canonical<'a>(&'a self, verb: &'a str) -> &'a str {
        self.aliases.get(verb).copied().unwrap_or(verb)
    }

    pub fn get(&self, canonical: &str) -> Option<&dyn Builtin> {
        self.builtins.get(canonical).map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a CommandRegistry with all built-in commands registered.
pub fn default_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(Box::new(nav::Help));
    registry.register(Box::new(nav::Pwd));
    registry.register(Box::new(nav::Cd));
    registry.register(Box::new(files::Stat));
    registry.register(Box::new(files::Cat));
    registry.register(Box::new(files::Write));
    registry.register(Box::new(files::Append));
    registry.register(Box::new(files::Mv));
    registry.register(Box::new(files::Cp));
    registry.register(Box::new(remove::Rm));
    registry.register(Box::new(remove::Restore));
    registry.register(Box::new(remove::EmptyTrash));
    registry.register(Box::new(text::Head));
    registry.register(Box::new(text::Tail));
    registry.register(Box::new(text::Grep));
    registry.register(Box::new(text::Wc));
    registry.register(Box::new(walk::Find));
    registry.register(Box::new(walk::Tree));
    registry.register(Box::new(hash::Hash::md5()));
    registry.register(Box::new(hash::Hash::sha256()));
    registry.register(Box::new(stats::Stats));
    registry.alias("dir", "ls");
    registry
}

/// The argument at `idx`, or a usage error.
pub(crate) fn arg<'a>(args: &'a [String], idx: usize, usage: &str) -> Result<&'a str, CommandError> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| CommandError::usage(usage))
}

/// Parse the value following a numeric option such as `-n`.
pub(crate) fn count_value(flag: &str, value: Option<&String>) -> Result<usize, CommandError> {
    let value = value.ok_or_else(|| CommandError::Validation(format!("{} requires a number", flag)))?;
    value
        .parse()
        .map_err(|_| CommandError::Validation(format!("{}: invalid number '{}'", flag, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_allow_set() {
        let registry = default_registry();
        for verb in ALLOWED_COMMANDS {
            let canonical = registry.canonical(verb);
            assert!(
                registry.get(canonical).is_some() || NATIVE_COMMANDS.contains(&canonical),
                "'{}' has neither a built-in nor a native fallback",
                verb
            );
        }
    }

    #[test]
    fn test_registry_only_registers_allowed_verbs() {
        let registry = default_registry();
        for (name, _) in registry.builtins.iter() {
            assert!(ALLOWED_COMMANDS.contains(name), "'{}' not in allow-set", name);
        }
    }

    #[test]
    fn test_alias_resolution() {
        let registry = default_registry();
        assert_eq!(registry.canonical("dir"), "ls");
        assert_eq!(registry.canonical("type"), "cat");
        assert_eq!(registry.canonical("read"), "cat");
        assert_eq!(registry.canonical("ps"), "stats");
        assert_eq!(registry.canonical("grep"), "grep");
        assert_eq!(registry.canonical("nonexistent"), "nonexistent");
    }

    #[test]
    fn test_native_commands_have_no_builtin() {
        let registry = default_registry();
        for verb in NATIVE_COMMANDS {
            assert!(registry.get(verb).is_none(), "'{}' should be native", verb);
        }
    }

    #[test]
    fn test_registry_empty() {
        let registry = CommandRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.get("cat").is_none());
    }

    #[test]
    fn test_command_error_display_messages() {
        let err = CommandError::NotAllowed("sudo".to_string());
        assert_eq!(err.to_string(), "Command 'sudo' not allowed.");

        let err = CommandError::Timeout(7);
        assert_eq!(err.to_string(), "Process killed due to timeout (7s).");

        let err = CommandError::usage("cat <path>");
        assert_eq!(err.to_string(), "Usage: cat <path>");
    }

    #[test]
    fn test_command_error_io_classification() {
        let err = CommandError::io("open", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, CommandError::NotFound(_)));

        let err = CommandError::io("open", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, CommandError::PermissionDenied(_)));

        let err = CommandError::io("open", io::Error::other("boom"));
        assert!(matches!(err, CommandError::Internal(_)));
        assert!(err.to_string().starts_with("open: "));
    }

    #[test]
    fn test_command_result_json_omits_missing_rc() {
        let json = serde_json::to_value(CommandResult::success("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true, "stdout": "hi", "stderr": ""}));

        let mut native = CommandResult::failure("bad");
        native.rc = Some(2);
        let json = serde_json::to_value(native).unwrap();
        assert_eq!(json["rc"], 2);
    }

    #[test]
    fn test_command_result_from_result() {
        let ok: CommandResult = Ok::<_, CommandError>("done".to_string()).into();
        assert!(ok.ok);
        let err: CommandResult = Err::<String, _>(CommandError::NotFound("gone".to_string())).into();
        assert!(!err.ok);
        assert_eq!(err.stderr, "gone");
    }
}
