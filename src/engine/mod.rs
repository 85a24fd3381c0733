pub mod cwd;
pub mod fallback;

use crate::commands::{
    default_registry, CommandError, CommandRegistry, CommandResult, ALLOWED_COMMANDS,
};
use crate::config::Config;
use crate::sandbox::translate::{host_translator, ArgTranslator};
use crate::sandbox::ProcessSupervisor;
use crate::security::PathResolver;
use crate::system::{default_provider, StatsProvider};
use crate::trash::TrashStore;
use cwd::WorkingDir;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// The command interpreter and the state it confines: sandbox root, working
/// directory, trash area and the native process slot.
pub struct Engine {
    resolver: PathResolver,
    cwd: WorkingDir,
    trash: TrashStore,
    supervisor: ProcessSupervisor,
    translator: Box<dyn ArgTranslator>,
    stats: Box<dyn StatsProvider>,
    registry: CommandRegistry,
}

impl Engine {
    /// Build an engine from configuration, creating the sandbox root if needed.
    pub fn new(config: &Config) -> io::Result<Self> {
        let resolver = PathResolver::new(config.sandbox.root_path())?;
        let root = resolver.root().to_path_buf();
        Ok(Self {
            cwd: WorkingDir::new(root.clone()),
            trash: TrashStore::new(&root, &config.sandbox.trash_dir),
            supervisor: ProcessSupervisor::new(&config.process),
            translator: host_translator(),
            stats: default_provider(),
            registry: default_registry(),
            resolver,
        })
    }

    pub fn with_translator(mut self, translator: Box<dyn ArgTranslator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_stats_provider(mut self, stats: Box<dyn StatsProvider>) -> Self {
        self.stats = stats;
        self
    }

    /// Execute one command line. Never panics past this point; any fault
    /// becomes a failed result.
    pub fn execute(&self, line: &str) -> CommandResult {
        catch_unwind(AssertUnwindSafe(|| self.dispatch(line))).unwrap_or_else(|_| {
            error!(line, "command panicked");
            CommandResult::failure("Error: internal failure")
        })
    }

    /// Cancel the native process currently running, if any.
    pub fn cancel(&self) -> CommandResult {
        self.supervisor.cancel()
    }

    /// The sorted allow-set, aliases included.
    pub fn allowed() -> Vec<&'static str> {
        let mut verbs = ALLOWED_COMMANDS.to_vec();
        verbs.sort_unstable();
        verbs
    }

    fn dispatch(&self, line: &str) -> CommandResult {
        let tokens = match shell_words::split(line) {
            Ok(tokens) => tokens,
            Err(e) => {
                return CommandResult::error(CommandError::Validation(format!(
                    "Could not parse command: {}",
                    e
                )))
            }
        };
        let Some(first) = tokens.first() else {
            return CommandResult::failure("Empty command.");
        };

        let base = first.to_lowercase();
        if !ALLOWED_COMMANDS.contains(&base.as_str()) {
            warn!(verb = %base, "rejected command");
            return CommandResult::error(CommandError::NotAllowed(base));
        }

        let verb = self.registry.canonical(&base);
        let args = &tokens[1..];
        debug!(verb, argc = args.len(), "dispatching");
        match self.registry.get(verb) {
            Some(builtin) => builtin.execute(self, args).into(),
            None => self.run_native(verb, args),
        }
    }

    fn run_native(&self, verb: &str, args: &[String]) -> CommandResult {
        let (argv, cwd) = self.cwd.with(|cwd| {
            let argv = fallback::native_argv(verb, args, |t| self.resolver.resolve(t, cwd));
            (argv, cwd.to_path_buf())
        });
        let argv = self.translator.translate(argv);
        self.supervisor.spawn(&argv, &cwd)
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn trash(&self) -> &TrashStore {
        &self.trash
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn stats_provider(&self) -> &dyn StatsProvider {
        self.stats.as_ref()
    }

    pub fn cwd(&self) -> PathBuf {
        self.cwd.get()
    }

    /// Resolve `input` against the current directory.
    pub fn resolve(&self, input: &str) -> PathBuf {
        self.cwd.with(|cwd| self.resolver.resolve(input, cwd))
    }

    /// Resolve `input` and require that something exists there.
    pub fn resolve_existing(&self, input: &str) -> Result<PathBuf, CommandError> {
        let path = self.resolve(input);
        if path.symlink_metadata().is_ok() {
            Ok(path)
        } else {
            Err(CommandError::NotFound(format!("File not found: {}", input)))
        }
    }

    /// Resolve `input` and require a regular file.
    pub fn resolve_file(&self, input: &str) -> Result<PathBuf, CommandError> {
        let path = self.resolve_existing(input)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(CommandError::WrongType(format!("Not a regular file: {}", input)))
        }
    }

    /// Switch the working directory; unchanged if the target is not a directory.
    pub fn change_dir(&self, input: &str) -> Result<PathBuf, CommandError> {
        self.cwd.change(|cwd| {
            let target = self.resolver.resolve(input, cwd);
            if target.is_dir() {
                Ok(target)
            } else {
                Err(CommandError::NotFound(format!(
                    "Directory not found: {}",
                    self.resolver.relative(&target)
                )))
            }
        })
    }
}
