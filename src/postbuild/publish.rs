//! Publish-to-itch.io action
//!
//! Pushes the artifact root to an itch.io channel with butler, then asks
//! for the channel's status so the upload's processing state lands in the
//! log. A missing butler install is reported distinctly, with the install
//! link, rather than as a generic command failure.

use std::path::PathBuf;

use crate::error::Result;
use crate::events::Reporter;
use crate::process::{Executor, ProcessCommand, RunOptions};

pub const STEP_NAME: &str = "Publish on itch.io";

pub const BUTLER_HINT: &str = "https://itch.io/docs/butler/";

/// Environment override for butler installs that are not on PATH.
const BUTLER_PROGRAM_ENV: &str = "PARBUILD_BUTLER";

pub struct PublishStep {
    artifact_root: PathBuf,
    channel: String,
    program: String,
    executor: Executor,
    reporter: Reporter,
}

impl PublishStep {
    pub fn new(
        artifact_root: PathBuf,
        user: &str,
        game: &str,
        channel: &str,
        reporter: Reporter,
    ) -> Self {
        Self {
            artifact_root,
            channel: format!("{user}/{game}:{channel}"),
            program: std::env::var(BUTLER_PROGRAM_ENV).unwrap_or_else(|_| "butler".to_string()),
            executor: Executor::new(reporter.clone()),
            reporter,
        }
    }

    /// Use a specific butler executable instead of the default lookup.
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    pub fn run(&self) -> Result<()> {
        self.reporter
            .message(&format!("Publishing to itch.io ({})...", self.channel));
        let root = self.artifact_root.to_string_lossy();
        self.run_butler(&["push", root.as_ref(), &self.channel])?;
        self.run_butler(&["status", &self.channel])?;
        Ok(())
    }

    pub fn stop(&self) {
        self.executor.stop();
    }

    fn run_butler(&self, args: &[&str]) -> Result<String> {
        self.executor.run(
            ProcessCommand::new(&self.program).args(args.iter().copied()),
            RunOptions::default().with_tool_hint(BUTLER_HINT),
        )
    }
}
