//! System metrics behind the `ps`/`stats` verb.

mod procfs;

use std::fmt;
use std::io;

pub use procfs::ProcfsProvider;

const TOP_PROCESSES: usize = 6;
const NAME_WIDTH: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub cpu_percent: f64,
    pub mem_used_bytes: u64,
    pub mem_total_bytes: u64,
    pub processes: Vec<ProcessInfo>,
}

impl SystemSnapshot {
    pub fn mem_percent(&self) -> f64 {
        if self.mem_total_bytes == 0 {
            0.0
        } else {
            self.mem_used_bytes as f64 * 100.0 / self.mem_total_bytes as f64
        }
    }
}

impl fmt::Display for SystemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MB: u64 = 1024 * 1024;
        writeln!(f, "CPU: {:.1}%", self.cpu_percent)?;
        writeln!(
            f,
            "Memory: {:.1}% ({}MB used of {}MB)",
            self.mem_percent(),
            self.mem_used_bytes / MB,
            self.mem_total_bytes / MB
        )?;
        writeln!(f)?;
        write!(f, "Top processes:")?;

        let mut top: Vec<&ProcessInfo> = self.processes.iter().collect();
        top.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        if top.is_empty() {
            return write!(f, "\nNo process info available (permission).");
        }
        for p in top.into_iter().take(TOP_PROCESSES) {
            let name: String = p.name.chars().take(NAME_WIDTH).collect();
            write!(
                f,
                "\n{:6} {:20} cpu={:5.1}% mem={:5.1}%",
                p.pid, name, p.cpu_percent, p.mem_percent
            )?;
        }
        Ok(())
    }
}

/// Source of CPU, memory and per-process figures.
pub trait StatsProvider: Send + Sync {
    fn snapshot(&self) -> io::Result<SystemSnapshot>;
}

/// The provider for this host.
pub fn default_provider() -> Box<dyn StatsProvider> {
    Box::new(ProcfsProvider::default())
}

/// Minimal identification used when no provider can answer.
pub fn platform_fallback() -> String {
    format!(
        "stats unavailable, platform: {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
