//! Test command execution under a deadline.
//!
//! The command runs through `sh -c` in its own process group, with stdout and
//! stderr drained by reader threads so a chatty child never blocks on a full
//! pipe. When the deadline passes, the whole group is killed and the child
//! reaped before returning; any stragglers left in the group after a normal
//! exit are killed as well, since a later run in the same sandbox would race
//! with them.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn test command `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed to wait for test command: {0}")]
    Wait(#[source] std::io::Error),
}

/// Captured output of a command that exited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunOutput),
    TimedOut { elapsed: Duration },
}

/// Run `command` with `cwd` as working directory, for at most `timeout`.
pub fn run_command(command: &str, cwd: &Path, timeout: Duration) -> Result<RunOutcome, ExecError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: command.to_string(),
        source,
    })?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let elapsed = start.elapsed();
                kill_group(&child);
                let output = RunOutput {
                    stdout: collect(stdout),
                    stderr: collect(stderr),
                    elapsed,
                    exit_code: status.code(),
                };
                debug!(code = ?output.exit_code, elapsed_ms = elapsed.as_millis() as u64, "test command finished");
                return Ok(RunOutcome::Completed(output));
            }
            Ok(None) => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    kill_group(&child);
                    let _ = child.kill();
                    child.wait().map_err(ExecError::Wait)?;
                    collect(stdout);
                    collect(stderr);
                    warn!(timeout_ms = timeout.as_millis() as u64, "test command timed out");
                    return Ok(RunOutcome::TimedOut { elapsed });
                }
                thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
            }
            Err(error) => {
                kill_group(&child);
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Wait(error));
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: killpg only sends a signal. The group id is the child's pid,
    // and a pid is not reused while a group with that id still exists.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}
