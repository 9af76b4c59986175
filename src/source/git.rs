//! Git repository source
//!
//! Clones the remote once per run, then on every later cycle pulls and
//! re-checks `HEAD`, sleeping in one-second increments between polls,
//! until the remote moves past the commit the previous cycle built. "No
//! new commit yet" is a normal polling outcome, not an error.
//!
//! Git writes normal progress for network commands to stderr, so `clone`
//! and `pull` request the stderr merge explicitly; `rev-parse` does not.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::events::Reporter;
use crate::fsops::{self, TEMP_PREFIX};
use crate::process::{Executor, ProcessCommand, RunOptions};

pub const STEP_NAME: &str = "Git repository";

const GIT_HINT: &str = "https://git-scm.com/";

pub struct GitSource {
    project_name: String,
    remote_url: String,
    polling_interval: Duration,
    temp_root: Mutex<Option<PathBuf>>,
    checkout: Mutex<Option<PathBuf>>,
    completed_cycles: AtomicU32,
    interrupt: CancelFlag,
    executor: Executor,
    reporter: Reporter,
}

impl GitSource {
    pub fn new(
        project_name: &str,
        remote_url: &str,
        polling_interval_seconds: u64,
        reporter: Reporter,
    ) -> Self {
        Self {
            project_name: project_name.to_string(),
            remote_url: remote_url.to_string(),
            polling_interval: Duration::from_secs(polling_interval_seconds),
            temp_root: Mutex::new(None),
            checkout: Mutex::new(None),
            completed_cycles: AtomicU32::new(0),
            interrupt: CancelFlag::new(),
            executor: Executor::new(reporter.clone()),
            reporter,
        }
    }

    /// Clone on the first cycle; afterwards wait for the remote to move
    /// to a commit the previous cycle did not build.
    pub fn next_working_copy(&self) -> Result<PathBuf> {
        let checkout = self.ensure_clone()?;

        if self.completed_cycles.load(Ordering::SeqCst) > 0 {
            let previous = self.rev_parse(&checkout)?;
            let interval = self.polling_interval;
            poll_until_new_commit(
                &previous,
                || self.pull(&checkout),
                || self.rev_parse(&checkout),
                interval,
                &self.interrupt,
                || {
                    self.reporter.message(&format!(
                        "No new changes, waiting {} seconds...",
                        interval.as_secs()
                    ));
                },
            )?;
        }

        Ok(checkout)
    }

    /// Revert anything the build tool wrote into the checkout so the next
    /// pull is not blocked by dirty files. Best-effort: a failure here is
    /// reported and surfaces properly on the next pull if it matters.
    pub fn end_cycle(&self) {
        let checkout = self.checkout.lock().unwrap().clone();
        if let Some(checkout) = checkout {
            if let Err(e) = self.reset_checkout(&checkout) {
                self.reporter
                    .long(format!("Could not reset working copy: {e}"));
            }
            self.completed_cycles.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn close(&self) {
        *self.checkout.lock().unwrap() = None;
        if let Some(temp_root) = self.temp_root.lock().unwrap().take() {
            fsops::remove_tree_best_effort(&temp_root);
        }
    }

    pub fn stop(&self) {
        self.interrupt.set();
        self.executor.stop();
    }

    fn ensure_clone(&self) -> Result<PathBuf> {
        if let Some(checkout) = self.checkout.lock().unwrap().clone() {
            return Ok(checkout);
        }

        let temp_root = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()?
            .into_path();
        let checkout = temp_root.join(&self.project_name);

        self.reporter.message(&format!(
            "Cloning {} to {}...",
            self.project_name,
            checkout.display()
        ));

        let result = self.executor.run(
            ProcessCommand::new("git")
                .arg("clone")
                .arg(&self.remote_url)
                .arg(checkout.to_string_lossy())
                .merge_stderr(true),
            RunOptions::default()
                .with_tool_hint(GIT_HINT)
                .with_error_context(format!("Cannot clone {}", self.remote_url)),
        );
        if let Err(e) = result {
            fsops::remove_tree_best_effort(&temp_root);
            return Err(e);
        }

        *self.temp_root.lock().unwrap() = Some(temp_root);
        *self.checkout.lock().unwrap() = Some(checkout.clone());
        Ok(checkout)
    }

    fn pull(&self, checkout: &Path) -> Result<()> {
        self.executor.run(
            ProcessCommand::new("git")
                .arg("pull")
                .current_dir(checkout)
                .merge_stderr(true),
            RunOptions::default().with_tool_hint(GIT_HINT),
        )?;
        Ok(())
    }

    fn rev_parse(&self, checkout: &Path) -> Result<String> {
        let output = self.executor.run(
            ProcessCommand::new("git")
                .args(["rev-parse", "HEAD"])
                .current_dir(checkout),
            RunOptions::captured().with_tool_hint(GIT_HINT),
        )?;
        Ok(output.trim().to_string())
    }

    fn reset_checkout(&self, checkout: &Path) -> Result<()> {
        self.executor.run(
            ProcessCommand::new("git")
                .args(["reset", "--hard", "HEAD"])
                .current_dir(checkout),
            RunOptions::captured().with_tool_hint(GIT_HINT),
        )?;
        self.executor.run(
            ProcessCommand::new("git")
                .args(["clean", "-df"])
                .current_dir(checkout),
            RunOptions::captured().with_tool_hint(GIT_HINT),
        )?;
        Ok(())
    }
}

/// Pull and re-check `HEAD` until it differs from `previous`, waiting
/// `interval` between polls (interruptibly, in ~1 s slices). `on_wait`
/// runs once before each wait, after a poll that saw no change.
fn poll_until_new_commit(
    previous: &str,
    mut pull: impl FnMut() -> Result<()>,
    mut head: impl FnMut() -> Result<String>,
    interval: Duration,
    interrupt: &CancelFlag,
    mut on_wait: impl FnMut(),
) -> Result<()> {
    loop {
        interrupt.check()?;
        pull()?;
        if head()? != previous {
            return Ok(());
        }
        on_wait();
        if interrupt.sleep(interval) {
            return Err(Error::Interrupted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[test]
    fn test_polls_until_head_moves() {
        // First response is consumed by the caller as `previous`; the
        // poll loop sees the rest.
        let responses = RefCell::new(VecDeque::from(["A", "A", "B"]));
        let pulls = RefCell::new(0u32);
        let waits = RefCell::new(0u32);

        poll_until_new_commit(
            "A",
            || {
                *pulls.borrow_mut() += 1;
                Ok(())
            },
            || Ok(responses.borrow_mut().pop_front().unwrap().to_string()),
            Duration::from_millis(5),
            &CancelFlag::new(),
            || *waits.borrow_mut() += 1,
        )
        .unwrap();

        assert_eq!(*pulls.borrow(), 3);
        assert_eq!(*waits.borrow(), 2);
        assert!(responses.borrow().is_empty());
    }

    #[test]
    fn test_new_commit_on_first_poll_skips_waiting() {
        let waits = RefCell::new(0u32);
        poll_until_new_commit(
            "A",
            || Ok(()),
            || Ok("B".to_string()),
            Duration::from_secs(30),
            &CancelFlag::new(),
            || *waits.borrow_mut() += 1,
        )
        .unwrap();
        assert_eq!(*waits.borrow(), 0);
    }

    #[test]
    fn test_interrupt_during_wait_stops_polling() {
        let interrupt = CancelFlag::new();
        let waker = interrupt.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            waker.set();
        });

        let err = poll_until_new_commit(
            "A",
            || Ok(()),
            || Ok("A".to_string()),
            Duration::from_secs(3600),
            &interrupt,
            || {},
        )
        .unwrap_err();
        handle.join().unwrap();

        assert!(err.is_interrupt());
    }

    #[test]
    fn test_interrupt_before_poll_skips_pull() {
        let interrupt = CancelFlag::new();
        interrupt.set();
        let pulls = RefCell::new(0u32);

        let err = poll_until_new_commit(
            "A",
            || {
                *pulls.borrow_mut() += 1;
                Ok(())
            },
            || Ok("A".to_string()),
            Duration::from_millis(5),
            &interrupt,
            || {},
        )
        .unwrap_err();

        assert!(err.is_interrupt());
        assert_eq!(*pulls.borrow(), 0);
    }

    #[test]
    fn test_pull_failure_propagates() {
        let err = poll_until_new_commit(
            "A",
            || {
                Err(Error::CommandFailed {
                    context: "Error running 'git pull'".to_string(),
                    output: String::new(),
                })
            },
            || Ok("A".to_string()),
            Duration::from_millis(5),
            &CancelFlag::new(),
            || {},
        )
        .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }
}
