//! Project configuration
//!
//! The build lane reads a TOML file describing the configured projects and
//! the process-wide git polling interval. It never writes the file;
//! creating and editing configurations is the caller's concern.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default seconds between git polls when waiting for a new commit.
pub const DEFAULT_GIT_POLLING_INTERVAL: u64 = 30;

fn default_git_polling_interval() -> u64 {
    DEFAULT_GIT_POLLING_INTERVAL
}

fn default_build_path() -> String {
    "Build/WebGL".to_string()
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub projects: Vec<Project>,

    /// Seconds to wait between pulls while polling a git source for a new
    /// commit.
    #[serde(default = "default_git_polling_interval")]
    pub git_polling_interval: u64,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::Config(e.to_string()))?;
        for project in &config.projects {
            project.validate()?;
        }
        Ok(config)
    }

    /// Platform-conventional location of the configuration file.
    pub fn default_path() -> PathBuf {
        let base = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home_dir())
        } else if cfg!(target_os = "macos") {
            home_dir().join("Library/Application Support")
        } else {
            home_dir().join(".config")
        };
        base.join("parbuild").join("config.toml")
    }

    /// Look up a project by name.
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }
}

pub(crate) fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// One configured project: where its sources come from, how it is built,
/// and what happens to a successful build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub source: ProjectSource,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub post_build: Vec<PostBuildAction>,
}

impl Project {
    /// Checks performed before a run is constructed; a project that fails
    /// here never reaches the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("project name must not be empty".to_string()));
        }
        if self.build.target == BuildTarget::Custom && self.build.method.is_none() {
            return Err(Error::MissingBuildMethod);
        }
        Ok(())
    }
}

/// Where a project's working copy comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// Local directory path, or git remote URL.
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Git,
}

/// Build settings for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub target: BuildTarget,

    /// Entry point passed to `-executeMethod`; required (and only
    /// meaningful) for the `Custom` target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Build output location, relative to the project root unless
    /// absolute.
    #[serde(default = "default_build_path")]
    pub path: String,

    /// Editor executable override for installs not managed by Unity Hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_path: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            target: BuildTarget::default(),
            method: None,
            path: default_build_path(),
            editor_path: None,
        }
    }
}

/// Unity build target. Serialized names match the spelling Unity's
/// `-build<Target>Player` flags expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildTarget {
    Windows,
    Windows64,
    #[serde(rename = "OSXUniversal")]
    MacOS,
    #[serde(rename = "Linux64")]
    Linux,
    #[default]
    WebGL,
    Custom,
}

impl BuildTarget {
    /// The `<Target>` fragment of Unity's native `-build<Target>Player`
    /// flag. Not meaningful for the scripted targets (`WebGL`, `Custom`).
    pub fn player_flag_name(&self) -> &'static str {
        match self {
            BuildTarget::Windows => "Windows",
            BuildTarget::Windows64 => "Windows64",
            BuildTarget::MacOS => "OSXUniversal",
            BuildTarget::Linux => "Linux64",
            BuildTarget::WebGL => "WebGL",
            BuildTarget::Custom => "Custom",
        }
    }

    /// Targets driven through `-executeMethod` rather than a native
    /// player flag.
    pub fn is_scripted(&self) -> bool {
        matches!(self, BuildTarget::WebGL | BuildTarget::Custom)
    }
}

/// A distribution step run after a successful build, in list order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PostBuildAction {
    /// Copy the build output into a destination directory.
    Copy { destination: String },
    /// Push the build output to an itch.io channel with butler.
    PublishItch {
        user: String,
        game: String,
        channel: String,
    },
}
