//! Process Executor
//!
//! Runs a compiled [`Invocation`] and classifies the result by exit code.
//! Output is streamed line by line to an [`OutputSink`] while the child
//! runs, so long playbooks show progress as they go.
//!
//! # Blocking
//!
//! `execute` blocks until the child exits. There is no timeout and no
//! cancellation: a tool that hangs blocks the caller indefinitely.

use crate::compiler::{EnvMap, Invocation};
use crate::error::{ExecResult, ExecutionError};
use serde::Serialize;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// Result of a tool that ran to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// `stdout` is rebuilt from the streamed lines: every line, including
    /// a final one the tool left unterminated, ends in `\n`, and invalid
    /// UTF-8 is replaced with U+FFFD.
    Success { stdout: String },
    Failure { exit_code: i32 },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { exit_code } => Some(*exit_code),
        }
    }

    /// `(None, Some(stdout))` on success, `(Some(code), None)` on failure
    pub fn into_pair(self) -> (Option<i32>, Option<String>) {
        match self {
            Self::Success { stdout } => (None, Some(stdout)),
            Self::Failure { exit_code } => (Some(exit_code), None),
        }
    }
}

/// Receives child output as it is produced
pub trait OutputSink {
    fn stdout_line(&mut self, line: &str);
    fn stderr_line(&mut self, line: &str);
}

/// Forwards child output to `tracing` (stdout at info, stderr at error)
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn stdout_line(&mut self, line: &str) {
        tracing::info!(target: "invocation::output", "{line}");
    }

    fn stderr_line(&mut self, line: &str) {
        tracing::error!(target: "invocation::output", "{line}");
    }
}

/// Everything needed to start a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    /// The complete child environment; nothing is inherited
    pub env: EnvMap,
    pub working_dir: Option<PathBuf>,
}

impl From<&Invocation> for SpawnRequest {
    fn from(invocation: &Invocation) -> Self {
        Self {
            program: invocation.program().to_string(),
            args: invocation.args(),
            env: invocation.environment().clone(),
            working_dir: invocation.working_dir().map(PathBuf::from),
        }
    }
}

/// Whether the child could not be started or was lost after starting
#[derive(Debug)]
pub enum SpawnFailure {
    Start(std::io::Error),
    Wait(std::io::Error),
}

/// Capability to run a child process to completion.
///
/// Returns the exit code. Implementations stream output to `sink` as it
/// arrives.
pub trait ProcessSpawner {
    fn run(&self, request: &SpawnRequest, sink: &mut dyn OutputSink) -> Result<i32, SpawnFailure>;
}

/// Spawns real processes with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpawner;

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl ProcessSpawner for SystemSpawner {
    fn run(&self, request: &SpawnRequest, sink: &mut dyn OutputSink) -> Result<i32, SpawnFailure> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(SpawnFailure::Start)?;

        // Both pipes feed one channel so the sink sees lines in arrival order
        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        for (stream, line) in rx {
            match stream {
                Stream::Stdout => sink.stdout_line(&line),
                Stream::Stderr => sink.stderr_line(&line),
            }
        }
        let lost = join_readers(readers);
        if lost > 0 {
            tracing::warn!(
                program = %request.program,
                readers = lost,
                "Output reader panicked; some output may be missing"
            );
        }

        let status = child.wait().map_err(SpawnFailure::Wait)?;
        Ok(exit_code(status))
    }
}

fn forward_lines<R>(reader: R, stream: Stream, tx: Sender<(Stream, String)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Join reader threads, returning how many panicked
fn join_readers(readers: Vec<JoinHandle<()>>) -> usize {
    readers
        .into_iter()
        .map(JoinHandle::join)
        .filter(Result::is_err)
        .count()
}

/// Exit code, or the negated signal number for a signalled child on Unix
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Keeps a copy of stdout while passing every line through
struct Capture<'a> {
    inner: &'a mut dyn OutputSink,
    stdout: String,
}

impl OutputSink for Capture<'_> {
    fn stdout_line(&mut self, line: &str) {
        self.stdout.push_str(line);
        self.stdout.push('\n');
        self.inner.stdout_line(line);
    }

    fn stderr_line(&mut self, line: &str) {
        self.inner.stderr_line(line);
    }
}

/// Runs invocations and classifies their exit codes
#[derive(Debug, Default, Clone)]
pub struct Executor<S = SystemSpawner> {
    spawner: S,
}

impl Executor<SystemSpawner> {
    pub fn system() -> Self {
        Self::new(SystemSpawner)
    }
}

impl<S: ProcessSpawner> Executor<S> {
    pub fn new(spawner: S) -> Self {
        Self { spawner }
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Run `invocation` to completion.
    ///
    /// A non-zero exit is returned as [`Outcome::Failure`], with an `ERROR:`
    /// line sent to the sink's stderr unless `hide_errors` is set. Only a
    /// failure to start (or wait on) the process is an `Err`.
    pub fn execute(
        &self,
        invocation: &Invocation,
        sink: &mut dyn OutputSink,
        hide_errors: bool,
    ) -> ExecResult<Outcome> {
        let request = SpawnRequest::from(invocation);
        tracing::debug!(
            tool = %invocation.tool(),
            command = %invocation.command_line(),
            "Executing"
        );

        let mut capture = Capture {
            inner: sink,
            stdout: String::new(),
        };
        let code = match self.spawner.run(&request, &mut capture) {
            Ok(code) => code,
            Err(SpawnFailure::Start(source)) => {
                tracing::error!(program = %request.program, "Failed to spawn: {source}");
                return Err(ExecutionError::Spawn {
                    program: request.program,
                    source,
                });
            }
            Err(SpawnFailure::Wait(source)) => {
                return Err(ExecutionError::Wait {
                    program: request.program,
                    source,
                })
            }
        };

        if code == 0 {
            return Ok(Outcome::Success {
                stdout: capture.stdout,
            });
        }

        if !hide_errors {
            capture.stderr_line(&format!(
                "ERROR: `{}` exited with code {code}",
                invocation.command_line()
            ));
        }
        Ok(Outcome::Failure { exit_code: code })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeSpawner, RecordingSink, Script};
    use super::*;
    use crate::tool::Tool;

    fn playbook() -> Invocation {
        let env: EnvMap = [("PYTHONUNBUFFERED".to_string(), "1".to_string())]
            .into_iter()
            .collect();
        Invocation::new(Tool::AnsiblePlaybook, "ansible-playbook", env)
            .with_positional(["site.yml", "-vv"])
            .with_flag("inventory_file", "hosts")
    }

    #[test]
    fn test_zero_exit_is_success_with_stdout() {
        let executor = Executor::new(FakeSpawner::new([Script::ok(&["PLAY [all]", "ok=1"])]));
        let mut sink = RecordingSink::default();

        let outcome = executor.execute(&playbook(), &mut sink, false).unwrap();

        assert_eq!(outcome.clone().into_pair(), (None, Some("PLAY [all]\nok=1\n".to_string())));
        assert_eq!(sink.stdout, vec!["PLAY [all]", "ok=1"]);
        assert!(sink.stderr.is_empty());
    }

    #[test]
    fn test_non_zero_exit_is_failure_and_reported() {
        let executor = Executor::new(FakeSpawner::new([Script::fail(2)]));
        let mut sink = RecordingSink::default();

        let outcome = executor.execute(&playbook(), &mut sink, false).unwrap();

        assert_eq!(outcome.into_pair(), (Some(2), None));
        assert_eq!(sink.stderr.len(), 1);
        assert!(sink.stderr[0].starts_with("ERROR: `ansible-playbook site.yml -vv"));
        assert!(sink.stderr[0].ends_with("exited with code 2"));
    }

    #[test]
    fn test_hide_errors_suppresses_error_line() {
        let executor = Executor::new(FakeSpawner::new([Script::fail(4)]));
        let mut sink = RecordingSink::default();

        let outcome = executor.execute(&playbook(), &mut sink, true).unwrap();

        assert_eq!(outcome.exit_code(), Some(4));
        assert!(sink.stderr.is_empty());
    }

    #[test]
    fn test_spawn_failure_is_an_error_not_an_outcome() {
        let executor = Executor::new(FakeSpawner::new([Script::Missing]));
        let mut sink = RecordingSink::default();

        let err = executor.execute(&playbook(), &mut sink, false).unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { ref program, .. } if program == "ansible-playbook"));
    }

    #[test]
    fn test_classification_is_stable_across_runs() {
        let executor = Executor::new(FakeSpawner::new([
            Script::ok(&["a"]),
            Script::fail(1),
            Script::ok(&["b"]),
            Script::fail(1),
        ]));
        let mut sink = RecordingSink::default();
        let codes: Vec<Option<i32>> = (0..4)
            .map(|_| executor.execute(&playbook(), &mut sink, true).unwrap().exit_code())
            .collect();
        assert_eq!(codes, vec![None, Some(1), None, Some(1)]);
    }

    #[test]
    fn test_request_carries_args_and_environment() {
        let executor = Executor::new(FakeSpawner::new([Script::ok(&[])]));
        executor
            .execute(&playbook(), &mut RecordingSink::default(), false)
            .unwrap();

        let requests = executor.spawner().requests.borrow();
        assert_eq!(
            requests[0].args,
            vec!["site.yml", "-vv", "--inventory-file=hosts"]
        );
        assert_eq!(requests[0].env["PYTHONUNBUFFERED"], "1");
    }

    #[test]
    fn test_join_readers_counts_panicked_threads() {
        let readers = vec![
            thread::spawn(|| {}),
            thread::spawn(|| panic!("reader failed")),
        ];
        assert_eq!(join_readers(readers), 1);
        assert_eq!(join_readers(Vec::new()), 0);
    }
}
