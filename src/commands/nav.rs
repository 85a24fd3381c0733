use super::{Builtin, CommandError};
use crate::engine::Engine;

pub struct Help;

impl Builtin for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn usage(&self) -> &'static str {
        "help"
    }

    fn execute(&self, _engine: &Engine, _args: &[String]) -> Result<String, CommandError> {
        Ok(format!("Allowed commands: {}", Engine::allowed().join(", ")))
    }
}

pub struct Pwd;

impl Builtin for Pwd {
    fn name(&self) -> &'static str {
        "pwd"
    }

    fn usage(&self) -> &'static str {
        "pwd"
    }

    fn execute(&self, engine: &Engine, _args: &[String]) -> Result<String, CommandError> {
        Ok(engine.cwd().display().to_string())
    }
}

pub struct Cd;

impl Builtin for Cd {
    fn name(&self) -> &'static str {
        "cd"
    }

    fn usage(&self) -> &'static str {
        "cd [path]"
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let target = args.first().map(String::as_str).unwrap_or(".");
        let dir = engine.change_dir(target)?;
        Ok(dir.display().to_string())
    }
}
