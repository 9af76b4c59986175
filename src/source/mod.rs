//! Source providers
//!
//! A source provider produces the working copy a build cycle runs
//! against. The two variants share one closed interface but little
//! behavior, so they are a sum type rather than a trait hierarchy:
//!
//! - [`LocalSource`] recreates the working copy from a fixed path on every
//!   cycle (fresh temp dir + deep copy, minus Unity's cache directories)
//! - [`GitSource`] clones once, then on each further cycle pulls and polls
//!   until the remote moves to a new commit
//!
//! Both are cancellable steps: `stop()` interrupts an in-flight copy at
//! file granularity, a git command mid-run, or the polling sleep.

mod git;
mod local;

use std::path::PathBuf;

pub use git::GitSource;
pub use local::LocalSource;

use crate::cancel::Stoppable;
use crate::config::{Project, SourceKind};
use crate::error::Result;
use crate::events::Reporter;

/// The working-copy producer for one project, alive for a whole run.
pub enum SourceProvider {
    Local(LocalSource),
    Git(GitSource),
}

impl SourceProvider {
    pub fn for_project(project: &Project, git_polling_interval: u64, reporter: Reporter) -> Self {
        match project.source.kind {
            SourceKind::Local => SourceProvider::Local(LocalSource::new(
                &project.name,
                &project.source.value,
                reporter,
            )),
            SourceKind::Git => SourceProvider::Git(GitSource::new(
                &project.name,
                &project.source.value,
                git_polling_interval,
                reporter,
            )),
        }
    }

    /// Step name reported in Started/Ended events.
    pub fn name(&self) -> &'static str {
        match self {
            SourceProvider::Local(_) => local::STEP_NAME,
            SourceProvider::Git(_) => git::STEP_NAME,
        }
    }

    /// Produce the project directory for the next build cycle. For a git
    /// source this blocks until the remote has a commit the previous
    /// cycle did not see, or until stopped.
    pub fn next_working_copy(&self) -> Result<PathBuf> {
        match self {
            SourceProvider::Local(source) => source.next_working_copy(),
            SourceProvider::Git(source) => source.next_working_copy(),
        }
    }

    /// Cycle cleanup: discard a local working copy, or revert build-tool
    /// droppings in the git checkout so the next pull applies cleanly.
    /// Runs on both normal and error exits of a cycle.
    pub fn end_cycle(&self) {
        match self {
            SourceProvider::Local(source) => source.end_cycle(),
            SourceProvider::Git(source) => source.end_cycle(),
        }
    }

    /// Run cleanup: remove whatever the provider keeps for the whole run.
    pub fn close(&self) {
        match self {
            SourceProvider::Local(source) => source.close(),
            SourceProvider::Git(source) => source.close(),
        }
    }
}

impl Stoppable for SourceProvider {
    fn stop(&self) {
        match self {
            SourceProvider::Local(source) => source.stop(),
            SourceProvider::Git(source) => source.stop(),
        }
    }
}
