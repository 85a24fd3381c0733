use super::{ProcessInfo, StatsProvider, SystemSnapshot};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Reads `/proc` twice, `interval` apart, and derives CPU usage from the
/// tick deltas. Hosts without procfs report an error.
pub struct ProcfsProvider {
    proc_root: PathBuf,
    interval: Duration,
}

impl Default for ProcfsProvider {
    fn default() -> Self {
        Self::new("/proc", Duration::from_millis(250))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    total: u64,
    idle: u64,
}

impl ProcfsProvider {
    pub fn new(proc_root: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            proc_root: proc_root.into(),
            interval,
        }
    }

    fn cpu_times(&self) -> io::Result<(CpuTimes, usize)> {
        let text = fs::read_to_string(self.proc_root.join("stat"))?;
        let times = text
            .lines()
            .next()
            .and_then(parse_cpu_line)
            .ok_or_else(|| invalid("malformed stat"))?;
        let cpus = text
            .lines()
            .filter(|l| l.starts_with("cpu") && l.as_bytes().get(3).is_some_and(u8::is_ascii_digit))
            .count();
        Ok((times, cpus.max(1)))
    }

    /// pid -> (name, utime + stime) for every readable process.
    fn process_ticks(&self) -> HashMap<u32, (String, u64)> {
        let Ok(entries) = fs::read_dir(&self.proc_root) else {
            return HashMap::new();
        };
        entries
            .flatten()
            .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
            .filter_map(|pid| {
                let stat = fs::read_to_string(self.proc_root.join(pid.to_string()).join("stat")).ok()?;
                parse_pid_stat(&stat).map(|entry| (pid, entry))
            })
            .collect()
    }

    fn rss_bytes(&self, pid: u32) -> Option<u64> {
        let status = fs::read_to_string(self.proc_root.join(pid.to_string()).join("status")).ok()?;
        kb_field(&status, "VmRSS:").map(|kb| kb * 1024)
    }
}

impl StatsProvider for ProcfsProvider {
    fn snapshot(&self) -> io::Result<SystemSnapshot> {
        let (before, cpus) = self.cpu_times()?;
        let procs_before = self.process_ticks();
        thread::sleep(self.interval);
        let (after, _) = self.cpu_times()?;
        let procs_after = self.process_ticks();

        let total_delta = after.total.saturating_sub(before.total);
        let idle_delta = after.idle.saturating_sub(before.idle);
        let cpu_percent = if total_delta == 0 {
            0.0
        } else {
            (total_delta - idle_delta.min(total_delta)) as f64 * 100.0 / total_delta as f64
        };

        let meminfo = fs::read_to_string(self.proc_root.join("meminfo"))?;
        let mem_total = kb_field(&meminfo, "MemTotal:").ok_or_else(|| invalid("no MemTotal"))? * 1024;
        let mem_available = kb_field(&meminfo, "MemAvailable:")
            .or_else(|| kb_field(&meminfo, "MemFree:"))
            .unwrap_or(0)
            * 1024;

        // Elapsed ticks per CPU; per-process shares may exceed 100 on multi-core hosts.
        let per_cpu_delta = total_delta as f64 / cpus as f64;
        let processes = procs_after
            .into_iter()
            .map(|(pid, (name, ticks))| {
                let prev = procs_before.get(&pid).map_or(ticks, |(_, t)| *t);
                let cpu = if per_cpu_delta > 0.0 {
                    ticks.saturating_sub(prev) as f64 * 100.0 / per_cpu_delta
                } else {
                    0.0
                };
                let mem = match (self.rss_bytes(pid), mem_total) {
                    (Some(rss), total) if total > 0 => rss as f64 * 100.0 / total as f64,
                    _ => 0.0,
                };
                ProcessInfo {
                    pid,
                    name,
                    cpu_percent: cpu,
                    mem_percent: mem,
                }
            })
            .collect();

        Ok(SystemSnapshot {
            cpu_percent,
            mem_used_bytes: mem_total.saturating_sub(mem_available),
            mem_total_bytes: mem_total,
            processes,
        })
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Aggregate `cpu` line: total of the first eight counters, idle + iowait.
fn parse_cpu_line(line: &str) -> Option<CpuTimes> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.take(8).map(|v| v.parse().ok()).collect::<Option<_>>()?;
    if values.len() < 4 {
        return None;
    }
    Some(CpuTimes {
        total: values.iter().sum(),
        idle: values[3] + values.get(4).copied().unwrap_or(0),
    })
}

/// `(comm, utime + stime)` from `/proc/<pid>/stat`. The name may contain
/// spaces and parentheses, so fields are counted from the last `)`.
fn parse_pid_stat(stat: &str) -> Option<(String, u64)> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let name = stat.get(open + 1..close)?.to_string();
    let rest: Vec<&str> = stat.get(close + 1..)?.split_whitespace().collect();
    // rest[0] is the state (field 3); utime and stime are fields 14 and 15.
    let utime: u64 = rest.get(11)?.parse().ok()?;
    let stime: u64 = rest.get(12)?.parse().ok()?;
    Some((name, utime + stime))
}

fn kb_field(text: &str, key: &str) -> Option<u64> {
    text.lines()
        .find_map(|l| l.strip_prefix(key))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}
