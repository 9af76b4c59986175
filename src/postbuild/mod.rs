//! Post-build actions
//!
//! Actions run strictly in configured order, only after a successful
//! build, each against the build's artifact root. A failed or cancelled
//! action stops the remaining actions for that cycle; completed actions
//! are not rolled back.

mod copy;
mod publish;

use std::path::{Path, PathBuf};

pub use copy::CopyStep;
pub use publish::PublishStep;

use crate::cancel::Stoppable;
use crate::config::PostBuildAction;
use crate::error::Result;
use crate::events::Reporter;

/// The directory distributed by post-build actions. A build path that
/// names a file (a player executable, say) contributes its parent
/// directory.
pub fn artifact_root(build_path: &Path) -> PathBuf {
    if build_path.is_file() {
        build_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| build_path.to_path_buf())
    } else {
        build_path.to_path_buf()
    }
}

/// One post-build action instance, constructed per cycle from its
/// configuration and the build's resolved output path.
pub enum PostBuildStep {
    Copy(CopyStep),
    Publish(PublishStep),
}

impl PostBuildStep {
    pub fn for_action(action: &PostBuildAction, build_path: &Path, reporter: Reporter) -> Self {
        let root = artifact_root(build_path);
        match action {
            PostBuildAction::Copy { destination } => {
                PostBuildStep::Copy(CopyStep::new(root, destination, reporter))
            }
            PostBuildAction::PublishItch {
                user,
                game,
                channel,
            } => PostBuildStep::Publish(PublishStep::new(root, user, game, channel, reporter)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PostBuildStep::Copy(_) => copy::STEP_NAME,
            PostBuildStep::Publish(_) => publish::STEP_NAME,
        }
    }

    pub fn run(&self) -> Result<()> {
        match self {
            PostBuildStep::Copy(step) => step.run(),
            PostBuildStep::Publish(step) => step.run(),
        }
    }
}

impl Stoppable for PostBuildStep {
    fn stop(&self) {
        match self {
            PostBuildStep::Copy(step) => step.stop(),
            PostBuildStep::Publish(step) => step.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_artifact_root_of_directory_is_itself() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(artifact_root(dir.path()), dir.path());
    }

    #[test]
    fn test_artifact_root_of_file_is_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("game.exe");
        fs::write(&file, "bin").unwrap();
        assert_eq!(artifact_root(&file), dir.path());
    }

    #[test]
    fn test_artifact_root_of_missing_path_is_itself() {
        let path = Path::new("/not/built/yet");
        assert_eq!(artifact_root(path), path);
    }
}
