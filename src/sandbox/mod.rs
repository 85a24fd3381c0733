pub mod translate;

use crate::commands::{CommandError, CommandResult};
use crate::config::ProcessConfig;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDOUT_MARKER: &str = "\n[truncated output]";
const STDERR_MARKER: &str = "\n[truncated stderr]";

/// One spawned child. The waiting call and [`ProcessSupervisor::cancel`]
/// share it; the child lock is never held across a poll interval.
struct Tracked {
    child: Mutex<Child>,
    pid: u32,
    cancelled: AtomicBool,
}

impl Tracked {
    fn child(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }
}

enum Outcome {
    Exited(ExitStatus),
    TimedOut,
    WaitFailed(io::Error),
}

/// Runs native processes with a fixed timeout.
///
/// Every request is launched; the slot only remembers the newest one, which
/// is the process [`cancel`] reaches from another thread while [`spawn`] is
/// blocked waiting.
///
/// [`cancel`]: ProcessSupervisor::cancel
/// [`spawn`]: ProcessSupervisor::spawn
pub struct ProcessSupervisor {
    current: Mutex<Option<Arc<Tracked>>>,
    timeout: Duration,
    max_output_chars: usize,
    kill_grace: Duration,
    salvage: Duration,
}

impl ProcessSupervisor {
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            current: Mutex::new(None),
            timeout: config.timeout(),
            max_output_chars: config.max_output_chars,
            kill_grace: config.kill_grace(),
            salvage: config.salvage(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// Launch `argv` in `working_dir` and block until it exits, times out or
    /// is cancelled.
    pub fn spawn(&self, argv: &[String], working_dir: &Path) -> CommandResult {
        let Some((program, args)) = argv.split_first() else {
            return CommandResult::failure("Empty command.");
        };

        let mut child = match Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CommandResult::error(CommandError::io(
                    &format!("Failed to run '{}'", program),
                    e,
                ))
            }
        };

        let pid = child.id();
        info!(pid, program = %program, "spawned native process");
        let stdout = OutputPipe::collect(child.stdout.take());
        let stderr = OutputPipe::collect(child.stderr.take());
        let tracked = Arc::new(Tracked {
            child: Mutex::new(child),
            pid,
            cancelled: AtomicBool::new(false),
        });
        if let Some(previous) = self.slot().replace(Arc::clone(&tracked)) {
            debug!(pid, previous = previous.pid, "slot now tracks the newer process");
        }

        let outcome = self.wait_tracked(&tracked);
        self.unregister(&tracked);
        let cancelled = tracked.cancelled.load(Ordering::SeqCst);

        let deadline = Instant::now() + self.salvage;
        let out = truncate_output(stdout.finish(deadline), self.max_output_chars, STDOUT_MARKER);
        let mut err = truncate_output(stderr.finish(deadline), self.max_output_chars, STDERR_MARKER);

        let rc = match outcome {
            Outcome::Exited(status) => status.code().unwrap_or(-1),
            Outcome::TimedOut => {
                push_note(&mut err, &CommandError::Timeout(self.timeout.as_secs()).to_string());
                -1
            }
            Outcome::WaitFailed(e) => {
                push_note(&mut err, &format!("Failed to wait for command: {}", e));
                -1
            }
        };
        if cancelled {
            push_note(&mut err, "Process cancelled.");
        }

        CommandResult {
            ok: rc == 0,
            stdout: out,
            stderr: err,
            rc: Some(rc),
        }
    }

    /// Terminate the tracked process: graceful signal first, force kill if it
    /// is still alive after the grace period.
    pub fn cancel(&self) -> CommandResult {
        let Some(tracked) = self.slot().clone() else {
            return CommandResult::failure("No running process to kill.");
        };

        tracked.cancelled.store(true, Ordering::SeqCst);
        let pid = tracked.pid;
        let mut child = tracked.child();
        if let Err(e) = terminate(&mut child) {
            debug!(pid, "graceful termination failed: {}", e);
        }
        match child.wait_timeout(self.kill_grace) {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = child.kill() {
                    warn!(pid, "force kill failed: {}", e);
                }
            }
        }
        info!(pid, "cancelled native process");
        CommandResult::success("Kill signal sent.")
    }

    fn wait_tracked(&self, tracked: &Tracked) -> Outcome {
        let started = Instant::now();
        loop {
            let mut child = tracked.child();
            match child.try_wait() {
                Ok(Some(status)) => return Outcome::Exited(status),
                Ok(None) if started.elapsed() >= self.timeout => {
                    warn!(
                        pid = tracked.pid,
                        "native process exceeded {:?}, killing", self.timeout
                    );
                    let _ = child.kill();
                    let _ = child.wait_timeout(self.salvage);
                    return Outcome::TimedOut;
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait_timeout(self.salvage);
                    return Outcome::WaitFailed(e);
                }
            }
            drop(child);
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Clear the slot, but only if a newer spawn has not taken it over.
    fn unregister(&self, tracked: &Arc<Tracked>) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, tracked)) {
            *slot = None;
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Tracked>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Output of one child pipe, drained on a background thread so a chatty
/// child never blocks on a full pipe.
struct OutputPipe {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl OutputPipe {
    fn collect<R: Read + Send + 'static>(source: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let reader = source.map(|mut src| {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                let mut chunk = [0u8; 8192];
                loop {
                    match src.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => buf
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .extend_from_slice(&chunk[..n]),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(_) => break,
                    }
                }
            })
        });
        Self { buf, reader }
    }

    /// Wait for the reader until `deadline`, then return whatever arrived.
    fn finish(self, deadline: Instant) -> String {
        if let Some(reader) = self.reader {
            while !reader.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            if reader.is_finished() {
                let _ = reader.join();
            }
        }
        let bytes = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Cut `text` to `max_chars` characters and append `marker` if anything was cut.
pub fn truncate_output(mut text: String, max_chars: usize, marker: &str) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
        text.push_str(marker);
    }
    text
}

fn push_note(buf: &mut String, note: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(note);
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(timeout_secs: u64, max_output_chars: usize) -> ProcessSupervisor {
        ProcessSupervisor::new(&ProcessConfig {
            timeout_secs,
            max_output_chars,
            kill_grace_ms: 100,
            salvage_ms: 500,
        })
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_truncate_output_short_untouched() {
        assert_eq!(truncate_output("abc".to_string(), 5, "!"), "abc");
        assert_eq!(truncate_output("abcde".to_string(), 5, "!"), "abcde");
    }

    #[test]
    fn test_truncate_output_counts_chars() {
        let out = truncate_output("ééééé".to_string(), 3, "[cut]");
        assert_eq!(out, "ééé[cut]");
        assert_eq!(out.chars().count(), 3 + "[cut]".len());
    }

    #[test]
    fn test_push_note_separates_lines() {
        let mut s = String::new();
        push_note(&mut s, "a");
        push_note(&mut s, "b");
        assert_eq!(s, "a\nb");
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_echo() {
        let sup = supervisor(5, 1000);
        let dir = tempfile::tempdir().unwrap();
        let result = sup.spawn(&argv(&["echo", "hello"]), dir.path());
        assert!(result.ok);
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.rc, Some(0));
        assert!(!sup.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_reports_exit_code() {
        let sup = supervisor(5, 1000);
        let dir = tempfile::tempdir().unwrap();
        let result = sup.spawn(&argv(&["sh", "-c", "echo oops >&2; exit 3"]), dir.path());
        assert!(!result.ok);
        assert_eq!(result.rc, Some(3));
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_uses_working_dir() {
        let sup = supervisor(5, 1000);
        let dir = tempfile::tempdir().unwrap();
        let result = sup.spawn(&argv(&["pwd"]), dir.path());
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            std::fs::canonicalize(result.stdout.trim()).unwrap(),
            expected
        );
    }

    #[test]
    fn test_spawn_missing_program() {
        let sup = supervisor(5, 1000);
        let dir = tempfile::tempdir().unwrap();
        let result = sup.spawn(&argv(&["definitely-not-a-real-binary-xyz"]), dir.path());
        assert!(!result.ok);
        assert!(result.stderr.contains("definitely-not-a-real-binary-xyz"));
        assert!(!sup.is_running());
    }

    #[test]
    fn test_spawn_empty_argv() {
        let sup = supervisor(5, 1000);
        let dir = tempfile::tempdir().unwrap();
        let result = sup.spawn(&[], dir.path());
        assert!(!result.ok);
        assert_eq!(result.stderr, "Empty command.");
    }

    #[cfg(unix)]
    #[test]
    fn test_large_output_does_not_block() {
        let sup = supervisor(10, 1_000_000);
        let dir = tempfile::tempdir().unwrap();
        let result = sup.spawn(&argv(&["seq", "1", "100000"]), dir.path());
        assert!(result.ok);
        assert_eq!(result.stdout.lines().count(), 100_000);
    }

    #[test]
    fn test_cancel_idle() {
        let sup = supervisor(5, 1000);
        let result = sup.cancel();
        assert!(!result.ok);
        assert_eq!(result.stderr, "No running process to kill.");
    }
}
