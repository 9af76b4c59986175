//! Copy-to-destination action

use std::fs;
use std::path::PathBuf;

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::events::Reporter;
use crate::fsops;

pub const STEP_NAME: &str = "Copy build";

/// Copies the artifact root into a destination directory, merging with
/// whatever is already there. Interruptible per file.
pub struct CopyStep {
    artifact_root: PathBuf,
    destination: PathBuf,
    interrupt: CancelFlag,
    reporter: Reporter,
}

impl CopyStep {
    pub fn new(artifact_root: PathBuf, destination: &str, reporter: Reporter) -> Self {
        Self {
            artifact_root,
            destination: PathBuf::from(destination),
            interrupt: CancelFlag::new(),
            reporter,
        }
    }

    pub fn run(&self) -> Result<()> {
        fs::create_dir_all(&self.destination)?;
        self.reporter.message(&format!(
            "Copy build from {} to {}",
            self.artifact_root.display(),
            self.destination.display()
        ));

        let result = fsops::copy_tree(
            &self.artifact_root,
            &self.destination,
            &[],
            &self.interrupt,
            &mut |_| {},
        );
        match result {
            Ok(_) => Ok(()),
            Err(Error::Interrupted) => {
                self.reporter.message("Build files copy stopped");
                Err(Error::Interrupted)
            }
            Err(e) => Err(e),
        }
    }

    pub fn stop(&self) {
        self.interrupt.set();
    }
}
