//! Editor executable resolution
//!
//! A Unity project records the editor version it was last opened with in
//! `ProjectSettings/ProjectVersion.txt` (a small YAML file). Unity Hub
//! installs each editor version under a fixed per-OS directory layout, so
//! version + OS is enough to locate the executable. Projects built with a
//! non-Hub install set `editor_path` in their build config instead.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::home_dir;
use crate::error::{Error, Result};

/// Install hint attached when the resolved editor executable is missing.
pub const UNITY_HINT: &str = "https://unity.com/download";

#[derive(Debug, Deserialize)]
struct ProjectVersion {
    #[serde(rename = "m_EditorVersion")]
    editor_version: String,
}

/// Read the editor version a project was authored with.
pub fn project_editor_version(project_path: &Path) -> Result<String> {
    let path = project_path
        .join("ProjectSettings")
        .join("ProjectVersion.txt");
    let contents = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let version: ProjectVersion = serde_yml::from_str(&contents)
        .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
    Ok(version.editor_version)
}

/// Path of the Unity Hub-managed editor executable for a version.
pub fn editor_executable(version: &str) -> Result<PathBuf> {
    if cfg!(windows) {
        Ok(PathBuf::from(format!(
            r"C:\Program Files\Unity\Hub\Editor\{version}\Editor\Unity.exe"
        )))
    } else if cfg!(target_os = "macos") {
        Ok(PathBuf::from(format!(
            "/Applications/Unity/Hub/Editor/{version}/Unity.app/Contents/MacOS/Unity"
        )))
    } else if cfg!(target_os = "linux") {
        Ok(home_dir().join(format!("Unity/Hub/Editor/{version}/Editor/Unity")))
    } else {
        Err(Error::Config(format!(
            "no known Unity install layout for {}",
            std::env::consts::OS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_editor_version_from_project() {
        let project = tempfile::tempdir().unwrap();
        let settings = project.path().join("ProjectSettings");
        fs::create_dir_all(&settings).unwrap();
        fs::write(
            settings.join("ProjectVersion.txt"),
            "m_EditorVersion: 2022.3.10f1\nm_EditorVersionWithRevision: 2022.3.10f1 (ff3792e53c62)\n",
        )
        .unwrap();

        let version = project_editor_version(project.path()).unwrap();
        assert_eq!(version, "2022.3.10f1");
    }

    #[test]
    fn test_missing_version_file_is_config_error() {
        let project = tempfile::tempdir().unwrap();
        let err = project_editor_version(project.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_executable_path_embeds_version() {
        let path = editor_executable("2022.3.10f1").unwrap();
        assert!(path.to_string_lossy().contains("2022.3.10f1"));
    }
}
