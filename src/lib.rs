//! parbuild - unattended Unity batch-mode build lane
//!
//! This crate automates repeated builds of a Unity project with the
//! user-installed editor: it acquires a working copy of the project (local
//! tree copy, or git clone with poll-for-new-commit), drives the editor in
//! batch mode while classifying its streamed log, runs post-build
//! distribution steps (copy to a destination, publish to itch.io), and
//! routes a single cooperative stop signal to whichever step is currently
//! in flight.
//!
//! The compiling itself is entirely the editor's job; this crate owns the
//! orchestration, the cancellation protocol, and the log classification.

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod fsops;
pub mod orchestrator;
pub mod postbuild;
pub mod process;
pub mod source;
pub mod unity;

pub use cancel::{CancelFlag, Stoppable};
pub use config::{BuildTarget, Config, PostBuildAction, Project, SourceKind};
pub use error::{Error, Result};
pub use events::{Event, EventSink, Reporter};
pub use orchestrator::{Orchestrator, RunOutcome};
