//! External process execution behind a fakeable capability trait.
//!
//! The artifact adapter is the only component that crosses a process
//! boundary, and it does so exclusively through [`ProcessRunner`], so tests
//! can script executions without spawning anything. The real implementation,
//! [`SystemRunner`], captures combined stdout/stderr through dedicated
//! reader threads (a blocked pipe cannot deadlock the wait loop) and
//! enforces a hard timeout, killing the child instead of hanging.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

/// Poll interval while waiting for a child process to exit.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Errors produced while running an external process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while supervising {program:?}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program:?} did not exit within {seconds}s")]
    Timeout { program: String, seconds: u64 },
}

/// An external command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl ProcessCommand {
    /// Build a command from a program and its arguments.
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
        }
    }

    /// Run the command from `dir`.
    pub fn in_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Value following a flag, if both are present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Completed process result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; -1 when the process was terminated by a signal.
    pub status: i32,
    /// Combined stdout and stderr.
    pub combined: String,
}

impl ProcessOutput {
    /// True if the process exited with status 0.
    #[inline]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Capability to run external commands.
pub trait ProcessRunner {
    /// Run `cmd` to completion and capture its result.
    fn run(&self, cmd: &ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Real subprocess execution with a hard timeout.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    /// Create a runner that kills children running longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
        program: &str,
    ) -> Result<Option<i32>, ProcessError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let status = child.try_wait().map_err(|source| ProcessError::Io {
                program: program.to_string(),
                source,
            })?;
            match status {
                Some(status) => return Ok(status.code()),
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProcessError::Timeout {
                        program: program.to_string(),
                        seconds: self.timeout.as_secs(),
                    });
                }
                None => thread::sleep(WAIT_POLL),
            }
        }
    }
}

impl Default for SystemRunner {
    /// Five minutes, generous enough for an artifact compile step.
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, cmd: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        debug!(program = %cmd.program, args = ?cmd.args, "spawning external process");

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cmd.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait_with_deadline(&mut child, &cmd.program)?;

        let mut combined = join_captured(stdout);
        combined.push_str(&join_captured(stderr));

        let output = ProcessOutput {
            status: status.unwrap_or(-1),
            combined,
        };
        debug!(status = output.status, "external process finished");
        Ok(output)
    }
}

/// Drain a pipe to a string on a dedicated thread.
fn drain<R: Read + Send + 'static>(stream: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = io::BufReader::new(stream);
        let _ = reader.read_to_string(&mut buf);
        buf
    })
}

fn join_captured(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_value_lookup() {
        let cmd = ProcessCommand::new(
            "scorer",
            vec!["--input".to_string(), "in.csv".to_string(), "--decimal".to_string()],
        );
        assert_eq!(cmd.flag_value("--input"), Some("in.csv"));
        assert_eq!(cmd.flag_value("--output"), None);
        assert_eq!(cmd.flag_value("--decimal"), None);
    }

    #[test]
    fn output_success() {
        assert!(ProcessOutput {
            status: 0,
            combined: String::new()
        }
        .success());
        assert!(!ProcessOutput {
            status: 2,
            combined: String::new()
        }
        .success());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_combined_output() {
        let runner = SystemRunner::new(Duration::from_secs(10));
        let cmd = ProcessCommand::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo out; echo err 1>&2; exit 3".to_string(),
            ],
        );
        let output = runner.run(&cmd).unwrap();
        assert_eq!(output.status, 3);
        assert!(output.combined.contains("out"));
        assert!(output.combined.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_times_out() {
        let runner = SystemRunner::new(Duration::from_millis(100));
        let cmd = ProcessCommand::new("sh", vec!["-c".to_string(), "sleep 5".to_string()]);
        let err = runner.run(&cmd).unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[test]
    fn system_runner_reports_spawn_failure() {
        let runner = SystemRunner::default();
        let cmd = ProcessCommand::new("definitely-not-a-real-binary", vec![]);
        let err = runner.run(&cmd).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
