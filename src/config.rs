use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub sandbox: SandboxConfig,
    pub process: ProcessConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Confinement root. Relative paths are taken from the current directory.
    pub root: String,
    /// Name of the trash area under the root.
    pub trash_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProcessConfig {
    pub timeout_secs: u64,
    pub max_output_chars: usize,
    pub kill_grace_ms: u64,
    pub salvage_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig {
                root: "sandbox".to_string(),
                trash_dir: ".trash".to_string(),
            },
            process: ProcessConfig::default(),
            logging: LoggingConfig {
                level: "warn".to_string(),
            },
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 7,
            max_output_chars: 20_000,
            kill_grace_ms: 200,
            salvage_ms: 2_000,
        }
    }
}

impl ProcessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn salvage(&self) -> Duration {
        Duration::from_millis(self.salvage_ms)
    }
}

impl SandboxConfig {
    /// The sandbox root as an absolute path.
    pub fn root_path(&self) -> PathBuf {
        let root = PathBuf::from(&self.root);
        if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        }
    }
}

impl Config {
    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".sandterm").join("config.toml"))
    }

    /// Load config from ~/.sandterm/config.toml, falling back to defaults.
    ///
    /// Runs before logging is set up, so a read or parse problem comes back
    /// as a message for the caller to report.
    pub fn load() -> (Self, Option<String>) {
        match Self::path() {
            Some(config_path) => Self::load_from(&config_path),
            None => (Self::default(), None),
        }
    }

    pub fn load_from(config_path: &Path) -> (Self, Option<String>) {
        if !config_path.exists() {
            return (Self::default(), None);
        }

        match std::fs::read_to_string(config_path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(config) => (config, None),
                Err(e) => (
                    Self::default(),
                    Some(format!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    )),
                ),
            },
            Err(e) => (
                Self::default(),
                Some(format!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                )),
            ),
        }
    }
}
