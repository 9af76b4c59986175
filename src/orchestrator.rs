//! Build orchestration
//!
//! One orchestrator instance drives one project through the pipeline:
//! acquire working copy → build → post-build actions, repeated in
//! continuous mode. All stage work is synchronous on the caller's thread;
//! callers that need a stop button run `run` on a background thread and
//! call `stop` from another.
//!
//! `stop` sets the run-level interrupt flag and forwards to whichever
//! step is currently active, so one external signal interrupts a copy, a
//! git command, the editor process, or a publish without the caller
//! knowing which stage is running. The flag is re-checked at every stage
//! boundary; a stage that has not started when cancellation arrives is
//! skipped, not started-then-stopped.
//!
//! The sequential stage layout is also what keeps the process invariant:
//! at most one editor process and one source-control process exist per
//! project at any time.

use std::sync::{Arc, Mutex};

use crate::cancel::{CancelFlag, StepSlot, Stoppable};
use crate::config::{Config, Project};
use crate::error::{Error, Result};
use crate::events::Reporter;
use crate::postbuild::PostBuildStep;
use crate::source::SourceProvider;
use crate::unity::hub::{NoopObserver, RecentProjectsObserver};
use crate::unity::{self, UnityBuilder};

/// Terminal outcome of one run. Exactly one is produced per run:
/// interruption is informational, distinct from both success and failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Interrupted,
    Failed { message: String, exit_code: i32 },
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded => 0,
            RunOutcome::Interrupted => 80,
            RunOutcome::Failed { exit_code, .. } => *exit_code,
        }
    }
}

pub struct Orchestrator {
    project: Project,
    git_polling_interval: u64,
    reporter: Reporter,
    cancel: CancelFlag,
    active: StepSlot,
    observer: Mutex<Box<dyn RecentProjectsObserver>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("project", &self.project)
            .field("git_polling_interval", &self.git_polling_interval)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Resolve and validate the named project. Configuration problems
    /// (an unknown name, a Custom target without a method) fail here,
    /// before any stage starts.
    pub fn new(config: &Config, project_name: &str, reporter: Reporter) -> Result<Self> {
        let project = config
            .project(project_name)
            .cloned()
            .ok_or_else(|| Error::ProjectNotFound(project_name.to_string()))?;
        project.validate()?;

        Ok(Self {
            project,
            git_polling_interval: config.git_polling_interval,
            reporter,
            cancel: CancelFlag::new(),
            active: StepSlot::new(),
            observer: Mutex::new(Box::new(NoopObserver)),
        })
    }

    /// Install the recently-used-projects observer ticked on every build
    /// output line.
    pub fn set_observer(&self, observer: Box<dyn RecentProjectsObserver>) {
        *self.observer.lock().unwrap() = observer;
    }

    /// Request the run to stop. Callable any number of times, from any
    /// thread; repeated calls while the editor resists termination drive
    /// the build invoker's kill escalation.
    pub fn stop(&self) {
        self.cancel.set();
        self.active.stop_active();
    }

    /// Execute the run and report its single terminal outcome.
    pub fn run(&self, continuous: bool) -> RunOutcome {
        match self.run_inner(continuous) {
            Ok(()) => RunOutcome::Succeeded,
            Err(Error::Interrupted) => {
                self.reporter.long("Build interrupted");
                RunOutcome::Interrupted
            }
            Err(e) => {
                // The build invoker already reported its own failure with
                // the captured error block; everything else is reported
                // here, once.
                if !matches!(e, Error::BuildFailed { .. }) {
                    self.reporter.error(e.to_string());
                }
                RunOutcome::Failed {
                    message: e.to_string(),
                    exit_code: e.exit_code(),
                }
            }
        }
    }

    fn run_inner(&self, continuous: bool) -> Result<()> {
        let source = Arc::new(SourceProvider::for_project(
            &self.project,
            self.git_polling_interval,
            self.reporter.clone(),
        ));

        let result = self.run_cycles(&source, continuous);
        source.close();
        result
    }

    fn run_cycles(&self, source: &Arc<SourceProvider>, continuous: bool) -> Result<()> {
        loop {
            self.cancel.check()?;
            let cycle = self.run_cycle(source);
            // Working-copy cleanup happens on success, failure and
            // cancellation alike.
            source.end_cycle();
            cycle?;
            if !continuous {
                return Ok(());
            }
        }
    }

    fn run_cycle(&self, source: &Arc<SourceProvider>) -> Result<()> {
        let source_step: Arc<dyn Stoppable> = source.clone();
        let working_copy = self.with_step(source.name(), source_step, || {
            source.next_working_copy()
        })?;
        // A stop that arrived while waiting for sources aborts the cycle
        // here, before the editor is ever started.
        self.cancel.check()?;

        let builder = Arc::new(UnityBuilder::new(
            &self.project.name,
            &working_copy,
            &self.project.build,
            self.reporter.clone(),
        )?);
        let builder_step: Arc<dyn Stoppable> = builder.clone();
        self.with_step(unity::STEP_NAME, builder_step, || {
            let mut observer = self.observer.lock().unwrap();
            builder.run(&mut **observer)
        })?;

        for action in &self.project.post_build {
            self.cancel.check()?;
            let step = Arc::new(PostBuildStep::for_action(
                action,
                builder.build_path(),
                self.reporter.clone(),
            ));
            let pb_step: Arc<dyn Stoppable> = step.clone();
            self.with_step(step.name(), pb_step, || step.run())?;
        }

        Ok(())
    }

    /// Run one stage: emit Started, publish the step for stop routing, do
    /// the work, withdraw the step, emit Ended. Ended is emitted whether
    /// the work succeeded, failed or was cancelled.
    fn with_step<T>(
        &self,
        name: &str,
        step: Arc<dyn Stoppable>,
        work: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.reporter.started(name);
        self.active.install(step);
        let result = work();
        self.active.clear();
        self.reporter.ended(name);
        result
    }
}
