use super::{Builtin, CommandError};
use crate::engine::Engine;
use crate::system::platform_fallback;

pub struct Stats;

impl Builtin for Stats {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ps"]
    }

    fn usage(&self) -> &'static str {
        "stats"
    }

    fn execute(&self, engine: &Engine, _args: &[String]) -> Result<String, CommandError> {
        match engine.stats_provider().snapshot() {
            Ok(snapshot) => Ok(snapshot.to_string()),
            Err(e) => {
                tracing::debug!("stats provider failed: {}", e);
                Ok(platform_fallback())
            }
        }
    }
}
