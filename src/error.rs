//! Error taxonomy for the build lane
//!
//! Every failure a run can end with is one of these variants:
//! - `ToolNotFound` carries an install hint and is never folded into a
//!   generic command failure
//! - `CommandFailed` / `BuildFailed` carry the captured output of the
//!   external command that failed
//! - `Interrupted` marks cooperative cancellation; it ends a run but is
//!   informational, not an error outcome

use std::io;

use thiserror::Error;

/// Errors produced by the build lane
#[derive(Debug, Error)]
pub enum Error {
    #[error("project '{0}' not found in configuration")]
    ProjectNotFound(String),

    #[error("build target Custom requires a `method` entry point")]
    MissingBuildMethod,

    #[error("cannot find `{tool}`! Please install it: {hint}")]
    ToolNotFound { tool: String, hint: String },

    #[error("{context}")]
    CommandFailed { context: String, output: String },

    #[error("Unity build failed ({code})")]
    BuildFailed { code: i32, log: String },

    #[error("interrupted")]
    Interrupted,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for build lane operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for this error.
    ///
    /// Only "0 means success" is part of the stable contract; the rest
    /// groups failures coarsely for scripting.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ProjectNotFound(_) | Error::Config(_) => 1,
            Error::MissingBuildMethod => 1,
            Error::ToolNotFound { .. } => 30,
            Error::CommandFailed { .. } => 50,
            Error::BuildFailed { .. } => 50,
            Error::Interrupted => 80,
            Error::Io(_) => 1,
        }
    }

    /// True for cooperative cancellation, which ends a run without
    /// marking it failed.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    /// Replace the install hint on a `ToolNotFound`; other variants pass
    /// through unchanged. Lets callers attach a tool-specific hint to a
    /// spawn failure reported by the process layer.
    pub fn with_hint(self, hint: &str) -> Self {
        match self {
            Error::ToolNotFound { tool, .. } => Error::ToolNotFound {
                tool,
                hint: hint.to_string(),
            },
            other => other,
        }
    }
}
