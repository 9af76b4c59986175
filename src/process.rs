//! Process runner
//!
//! Owns one external OS process at a time and gives callers:
//! - a lazy, finite stream of trimmed output lines read as they arrive
//! - polite termination (SIGTERM) and forced kill (SIGKILL) that are safe
//!   to call from another thread while the run thread is waiting
//! - a buffered [`Executor`] for run-to-completion commands (git, butler)
//!   that distinguishes "tool not found" from "tool ran and failed"
//!
//! Whether standard error is folded into a command's output is an explicit
//! per-command flag ([`ProcessCommand::merge_stderr`]), never inferred:
//! some tools (git among them) write normal progress to stderr. With the
//! flag set, stream order is only guaranteed to the extent that errors
//! arrive after or interleaved with stdout of the same invocation.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::events::Reporter;

/// Poll interval for non-blocking waits on a child process.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// An external command line, not yet spawned.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    merge_stderr: bool,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            merge_stderr: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Treat stderr as part of the command's output: merged into the
    /// streamed line sequence, and appended to the buffered output of a
    /// successful [`Executor::run`].
    pub fn merge_stderr(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The command as a single display string, for diagnostics.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Spawn the process with stdout and stderr captured separately.
    ///
    /// A missing executable surfaces as [`Error::ToolNotFound`] so callers
    /// can attach an install hint; every other spawn failure is an IO
    /// error.
    pub fn spawn(self) -> Result<RunningProcess> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound {
                    tool: self.program.clone(),
                    hint: String::new(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        let streams = Streams {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };

        Ok(RunningProcess {
            pid: child.id(),
            child: Mutex::new(child),
            streams: Mutex::new(Some(streams)),
            merge_stderr: self.merge_stderr,
        })
    }
}

struct Streams {
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// A spawned external process.
///
/// Shared via `Arc` between the run thread (which reads output and waits)
/// and stop callers (which terminate or kill). Waiting never holds the
/// child lock across a blocking call, so termination requests always get
/// through.
pub struct RunningProcess {
    child: Mutex<Child>,
    streams: Mutex<Option<Streams>>,
    pid: u32,
    merge_stderr: bool,
}

impl std::fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningProcess")
            .field("pid", &self.pid)
            .field("merge_stderr", &self.merge_stderr)
            .finish_non_exhaustive()
    }
}

impl RunningProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Lazy sequence of trimmed output lines, ending at EOF.
    ///
    /// Reads stdout (plus stderr when the command requested the merge) on
    /// background threads as the process produces it. Takes ownership of
    /// the output pipes; a second call yields an empty sequence.
    pub fn output_lines(&self) -> OutputLines {
        let taken = self.streams.lock().unwrap().take();
        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::new();

        if let Some(streams) = taken {
            if let Some(stdout) = streams.stdout {
                handles.push(spawn_line_reader(stdout, tx.clone()));
            }
            if self.merge_stderr {
                if let Some(stderr) = streams.stderr {
                    handles.push(spawn_line_reader(stderr, tx.clone()));
                }
            }
        }
        drop(tx);

        OutputLines {
            rx,
            _handles: handles,
        }
    }

    /// Read both output streams to EOF, invoking `on_stdout_line` for each
    /// trimmed stdout line as it arrives. Returns the collected
    /// `(stdout, stderr)` text with lines rejoined by `\n`.
    pub fn capture_with(&self, mut on_stdout_line: impl FnMut(&str)) -> Result<(String, String)> {
        let taken = self.streams.lock().unwrap().take();
        let Some(streams) = taken else {
            return Ok((String::new(), String::new()));
        };

        let stderr_handle = streams.stderr.map(|stderr| {
            thread::spawn(move || {
                let mut collected = String::new();
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => push_line(&mut collected, line.trim()),
                        Err(_) => break,
                    }
                }
                collected
            })
        });

        let mut stdout_text = String::new();
        if let Some(stdout) = streams.stdout {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                let line = line.trim();
                on_stdout_line(line);
                push_line(&mut stdout_text, line);
            }
        }

        let stderr_text = stderr_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        Ok((stdout_text, stderr_text))
    }

    /// Request graceful termination (SIGTERM-equivalent). Advisory: the
    /// process may take time to exit, or ignore it.
    pub fn terminate(&self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;
            let _ = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM);
        }
        #[cfg(not(unix))]
        {
            if let Ok(mut child) = self.child.lock() {
                let _ = child.kill();
            }
        }
    }

    /// Force termination (SIGKILL-equivalent). Escalation path only.
    pub fn kill(&self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;
            let _ = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGKILL);
        }
        #[cfg(not(unix))]
        {
            if let Ok(mut child) = self.child.lock() {
                let _ = child.kill();
            }
        }
    }

    /// Block until the process exits and return its exit code.
    ///
    /// Polls `try_wait` so a concurrent `terminate`/`kill` is never locked
    /// out. A signal-terminated process reports code -1.
    pub fn wait(&self) -> Result<i32> {
        loop {
            let status = self.child.lock().unwrap().try_wait()?;
            match status {
                Some(status) => return Ok(status.code().unwrap_or(-1)),
                None => thread::sleep(WAIT_POLL),
            }
        }
    }
}

fn spawn_line_reader<R: std::io::Read + Send + 'static>(
    stream: R,
    tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line.trim().to_string()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}

/// Iterator over a running process's output lines. Finite: ends when the
/// process closes its output streams.
pub struct OutputLines {
    rx: mpsc::Receiver<String>,
    _handles: Vec<JoinHandle<()>>,
}

impl Iterator for OutputLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.rx.recv().ok()
    }
}

/// Options for one buffered [`Executor::run`] invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Return the output to the caller instead of reporting it as
    /// LongMessage lines.
    pub capture: bool,
    /// Message for the [`Error::CommandFailed`] raised on nonzero exit;
    /// defaults to naming the command line.
    pub error_context: Option<String>,
    /// Install hint attached when the executable itself is missing.
    pub tool_hint: Option<String>,
}

impl RunOptions {
    pub fn captured() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    pub fn with_error_context(mut self, context: impl Into<String>) -> Self {
        self.error_context = Some(context.into());
        self
    }

    pub fn with_tool_hint(mut self, hint: impl Into<String>) -> Self {
        self.tool_hint = Some(hint.into());
        self
    }
}

/// Runs external commands to completion, one at a time, reporting their
/// output through a [`Reporter`] and keeping the in-flight process
/// reachable for cancellation.
pub struct Executor {
    reporter: Reporter,
    current: Mutex<Option<Arc<RunningProcess>>>,
}

impl Executor {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            reporter,
            current: Mutex::new(None),
        }
    }

    /// Run a command to completion.
    ///
    /// On success returns the collected stdout (stderr appended when the
    /// command set `merge_stderr`); unless `capture` was requested, each
    /// stdout line is also reported as a LongMessage while the command
    /// runs. On nonzero exit the combined output is reported as an
    /// ErrorMessage (some tools write their errors to stdout) and
    /// [`Error::CommandFailed`] is returned.
    pub fn run(&self, cmd: ProcessCommand, opts: RunOptions) -> Result<String> {
        let display = cmd.display();
        let merge_stderr = cmd.merge_stderr;

        let process = Arc::new(cmd.spawn().map_err(|e| match &opts.tool_hint {
            Some(hint) => e.with_hint(hint),
            None => e,
        })?);
        *self.current.lock().unwrap() = Some(process.clone());

        let result = self.drive(&process, merge_stderr, &display, &opts);

        *self.current.lock().unwrap() = None;
        result
    }

    fn drive(
        &self,
        process: &RunningProcess,
        merge_stderr: bool,
        display: &str,
        opts: &RunOptions,
    ) -> Result<String> {
        let (stdout, stderr) = process.capture_with(|line| {
            if !opts.capture {
                self.reporter.long(line);
            }
        })?;
        let code = process.wait()?;

        if code == 0 {
            let mut output = stdout;
            if merge_stderr && !stderr.is_empty() {
                if !opts.capture {
                    for line in stderr.lines() {
                        self.reporter.long(line);
                    }
                }
                push_line(&mut output, &stderr);
            }
            Ok(output)
        } else {
            let mut combined = stdout;
            push_line(&mut combined, &stderr);
            let combined = combined.trim().to_string();
            if !combined.is_empty() {
                self.reporter.error(combined.clone());
            }
            Err(Error::CommandFailed {
                context: opts
                    .error_context
                    .clone()
                    .unwrap_or_else(|| format!("Error running '{display}'")),
                output: combined,
            })
        }
    }

    /// Ask the in-flight command, if any, to terminate.
    pub fn stop(&self) {
        let current = self.current.lock().unwrap().clone();
        if let Some(process) = current {
            process.terminate();
        }
    }
}

/// Probe an external tool by running `<program> --version`.
///
/// Returns the first line of its output; a missing executable maps to
/// [`Error::ToolNotFound`] carrying `hint`.
pub fn probe_tool(program: &str, hint: &str) -> Result<String> {
    let process = ProcessCommand::new(program)
        .arg("--version")
        .spawn()
        .map_err(|e| e.with_hint(hint))?;
    let (stdout, stderr) = process.capture_with(|_| {})?;
    let code = process.wait()?;
    if code == 0 {
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    } else {
        Err(Error::CommandFailed {
            context: format!("'{program} --version' failed"),
            output: if stderr.is_empty() { stdout } else { stderr },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_streamed_lines_are_trimmed_and_finite() {
        let process = ProcessCommand::new("sh")
            .args(["-c", "echo '  one  '; echo two"])
            .spawn()
            .unwrap();
        let lines: Vec<String> = process.output_lines().collect();
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(process.wait().unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_merged_stderr_appears_in_stream() {
        let process = ProcessCommand::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .merge_stderr(true)
            .spawn()
            .unwrap();
        let mut lines: Vec<String> = process.output_lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["err".to_string(), "out".to_string()]);
        process.wait().unwrap();
    }

    #[test]
    fn test_missing_executable_is_tool_not_found() {
        let err = ProcessCommand::new("parbuild-no-such-tool-xyz")
            .spawn()
            .unwrap_err();
        match err {
            Error::ToolNotFound { tool, .. } => {
                assert_eq!(tool, "parbuild-no-such-tool-xyz");
            }
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_executor_returns_stdout_on_success() {
        let executor = Executor::new(Reporter::discard());
        let output = executor
            .run(
                ProcessCommand::new("sh").args(["-c", "echo hello"]),
                RunOptions::captured(),
            )
            .unwrap();
        assert_eq!(output, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_executor_merges_stderr_when_requested() {
        let executor = Executor::new(Reporter::discard());
        let output = executor
            .run(
                ProcessCommand::new("sh")
                    .args(["-c", "echo out; echo err >&2"])
                    .merge_stderr(true),
                RunOptions::captured(),
            )
            .unwrap();
        assert!(output.contains("out"));
        assert!(output.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn test_executor_failure_carries_output_and_context() {
        let executor = Executor::new(Reporter::discard());
        let err = executor
            .run(
                ProcessCommand::new("sh").args(["-c", "echo broken >&2; exit 3"]),
                RunOptions::captured().with_error_context("probe failed"),
            )
            .unwrap_err();
        match err {
            Error::CommandFailed { context, output } => {
                assert_eq!(context, "probe failed");
                assert!(output.contains("broken"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_unblocks_wait() {
        let process = Arc::new(
            ProcessCommand::new("sh")
                .args(["-c", "exec sleep 30"])
                .spawn()
                .unwrap(),
        );
        let stopper = Arc::clone(&process);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stopper.terminate();
        });
        let code = process.wait().unwrap();
        handle.join().unwrap();
        assert_ne!(code, 0);
    }

    #[test]
    fn test_probe_tool_missing_carries_hint() {
        let err = probe_tool("parbuild-no-such-tool-xyz", "https://example.com/install").unwrap_err();
        match err {
            Error::ToolNotFound { hint, .. } => assert_eq!(hint, "https://example.com/install"),
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
    }
}
