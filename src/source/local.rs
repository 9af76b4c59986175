//! Local directory source

use std::path::PathBuf;
use std::sync::Mutex;

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::events::Reporter;
use crate::fsops::{self, TEMP_PREFIX, UNITY_IGNORE_DIRS};

pub const STEP_NAME: &str = "Local project";

/// Produces a fresh working copy of a local project directory each cycle.
///
/// The copy is made into a new temporary directory every time so the
/// build never touches the user's own project tree, and is deleted when
/// the cycle ends, whether it succeeded or not.
pub struct LocalSource {
    project_name: String,
    project_path: PathBuf,
    temp_root: Mutex<Option<PathBuf>>,
    interrupt: CancelFlag,
    reporter: Reporter,
}

impl LocalSource {
    pub fn new(project_name: &str, project_path: &str, reporter: Reporter) -> Self {
        Self {
            project_name: project_name.to_string(),
            project_path: PathBuf::from(project_path),
            temp_root: Mutex::new(None),
            interrupt: CancelFlag::new(),
            reporter,
        }
    }

    pub fn next_working_copy(&self) -> Result<PathBuf> {
        // Deletion is ours: `end_cycle` uses the robust removal that
        // tolerates Windows path-length limits and already-gone paths.
        let temp_root = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()?
            .into_path();
        *self.temp_root.lock().unwrap() = Some(temp_root.clone());

        self.reporter.message(&format!(
            "Copying {} files to {}...",
            self.project_name,
            temp_root.display()
        ));

        let project_dir = temp_root.join(&self.project_name);
        let result = fsops::copy_tree(
            &self.project_path,
            &project_dir,
            UNITY_IGNORE_DIRS,
            &self.interrupt,
            &mut |_| {},
        );

        match result {
            Ok(_) => Ok(project_dir),
            Err(Error::Interrupted) => {
                self.reporter.message("Project files copy stopped");
                Err(Error::Interrupted)
            }
            Err(e) => Err(e),
        }
    }

    pub fn end_cycle(&self) {
        if let Some(temp_root) = self.temp_root.lock().unwrap().take() {
            fsops::remove_tree_best_effort(&temp_root);
        }
    }

    pub fn close(&self) {
        self.end_cycle();
    }

    pub fn stop(&self) {
        self.interrupt.set();
    }
}
