//! Unity build invoker
//!
//! Translates a project's build settings into one batch-mode editor
//! command line, runs it, and classifies the streamed log. The editor has
//! no generic headless WebGL export entry point, so that target first
//! materializes a small build-driver script inside the project's editor
//! extension folder and drives it through `-executeMethod`; native
//! targets use the editor's `-build<Target>Player` flags directly.
//!
//! Stopping a running build is graceful-first: the first stop request
//! sends the polite termination signal. The editor is known to sometimes
//! hang on termination, so the third request escalates to a forced kill.

pub mod editor;
pub mod hub;
pub mod logparse;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::cancel::{CancelFlag, Stoppable};
use crate::config::{BuildConfig, BuildTarget};
use crate::error::{Error, Result};
use crate::events::Reporter;
use crate::process::{ProcessCommand, RunningProcess};

use editor::{editor_executable, project_editor_version, UNITY_HINT};
use hub::RecentProjectsObserver;
use logparse::LogClassifier;

pub const STEP_NAME: &str = "Unity build";

/// Stop requests on a still-running editor before escalating to SIGKILL.
const KILL_AFTER_STOP_REQUESTS: u32 = 3;

/// Entry point of the generated WebGL build driver.
const WEBGL_BUILD_METHOD: &str = "ParBuild.WebGLBuilder.Build";

/// Editor-side build driver generated into the project for WebGL exports.
const WEBGL_BUILDER_SOURCE: &str = r#"using System;
using System.Linq;
using UnityEditor;

namespace ParBuild
{
    public class WebGLBuilder
    {
        private static string[] GetAllScenes()
        {
            return EditorBuildSettings.scenes
                 .Where(scene => scene.enabled)
                 .Select(scene => scene.path)
                 .ToArray();
        }

        private static string GetArg(string name, string defaultValue = null)
        {
            var args = Environment.GetCommandLineArgs();
            for (int i = 0; i < args.Length; i++)
            {
                if (args[i] == name && args.Length > i + 1)
                {
                    return args[i + 1];
                }
            }
            return defaultValue;
        }

        public static bool Build()
        {
            return Build(GetArg("-buildpath", "Build/WebGL"));
        }

        public static bool Build(string buildPath)
        {
            BuildPlayerOptions options = new BuildPlayerOptions()
            {
                locationPathName = buildPath,
                target = BuildTarget.WebGL,
                scenes = GetAllScenes()
            };
            var buildReport = BuildPipeline.BuildPlayer(options);
            return buildReport.summary.result == UnityEditor.Build.Reporting.BuildResult.Succeeded;
        }
    }
}
"#;

/// Write the WebGL build driver into `Assets/Editor`. Safe to repeat; the
/// script is regenerated on every WebGL build.
pub fn materialize_webgl_builder(project_path: &Path) -> Result<()> {
    let editor_dir = project_path.join("Assets").join("Editor");
    fs::create_dir_all(&editor_dir)?;
    fs::write(editor_dir.join("WebGLBuilder.cs"), WEBGL_BUILDER_SOURCE)?;
    Ok(())
}

/// Resolve the configured build path against the project directory.
pub fn resolve_build_path(project_path: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_path.join(path)
    }
}

/// The target-specific tail of the editor command line. Exactly one
/// build-output flag per target: `-executeMethod <entry> -buildpath` for
/// the scripted targets, `-build<Target>Player` for native ones.
pub fn compose_build_args(
    project_path: &Path,
    build: &BuildConfig,
    build_path: &Path,
) -> Result<Vec<String>> {
    let build_path = build_path.to_string_lossy().into_owned();
    match build.target {
        BuildTarget::WebGL => {
            materialize_webgl_builder(project_path)?;
            Ok(vec![
                "-executeMethod".to_string(),
                WEBGL_BUILD_METHOD.to_string(),
                "-buildpath".to_string(),
                build_path,
            ])
        }
        BuildTarget::Custom => {
            let method = build.method.clone().ok_or(Error::MissingBuildMethod)?;
            Ok(vec![
                "-executeMethod".to_string(),
                method,
                "-buildpath".to_string(),
                build_path,
            ])
        }
        target => Ok(vec![
            format!("-build{}Player", target.player_flag_name()),
            build_path,
        ]),
    }
}

/// One batch-mode build of one project working copy.
pub struct UnityBuilder {
    project_name: String,
    build_path: PathBuf,
    command: ProcessCommand,
    process: Mutex<Option<Arc<RunningProcess>>>,
    interrupt: CancelFlag,
    stop_requests: AtomicU32,
    reporter: Reporter,
}

impl UnityBuilder {
    /// Build against the editor install resolved from the project's
    /// recorded version (or the project's configured override).
    pub fn new(
        project_name: &str,
        project_path: &Path,
        build: &BuildConfig,
        reporter: Reporter,
    ) -> Result<Self> {
        let editor = match &build.editor_path {
            Some(path) => PathBuf::from(path),
            None => {
                let version = project_editor_version(project_path)?;
                editor_executable(&version)?
            }
        };
        Self::with_editor(project_name, project_path, build, &editor, reporter)
    }

    /// Build with an explicit editor executable.
    pub fn with_editor(
        project_name: &str,
        project_path: &Path,
        build: &BuildConfig,
        editor: &Path,
        reporter: Reporter,
    ) -> Result<Self> {
        let build_path = resolve_build_path(project_path, &build.path);
        let build_args = compose_build_args(project_path, build, &build_path)?;

        let command = ProcessCommand::new(editor.to_string_lossy())
            .args(["-quit", "-batchmode"])
            .arg("-projectpath")
            .arg(project_path.to_string_lossy())
            .args(["-logFile", "-"])
            .args(build_args);

        Ok(Self {
            project_name: project_name.to_string(),
            build_path,
            command,
            process: Mutex::new(None),
            interrupt: CancelFlag::new(),
            stop_requests: AtomicU32::new(0),
            reporter,
        })
    }

    /// The resolved (absolute) build output path; post-build actions take
    /// their artifact root from it.
    pub fn build_path(&self) -> &Path {
        &self.build_path
    }

    /// Run the build to completion, streaming classified log output.
    ///
    /// `observer` is ticked once per output line (see [`hub`]).
    pub fn run(&self, observer: &mut dyn RecentProjectsObserver) -> Result<()> {
        self.reporter
            .message(&format!("Starting new build of {}...", self.project_name));
        let started = Instant::now();

        let process = Arc::new(
            self.command
                .clone()
                .spawn()
                .map_err(|e| e.with_hint(UNITY_HINT))?,
        );
        *self.process.lock().unwrap() = Some(Arc::clone(&process));

        let mut classifier = LogClassifier::new();
        for line in process.output_lines() {
            self.reporter.long(line.clone());
            if let Some(short) = classifier.observe(&line) {
                self.reporter.short(short);
            }
            observer.tick();
        }

        let code = process.wait()?;
        *self.process.lock().unwrap() = None;

        if self.interrupt.is_set() {
            self.reporter.long("Unity build stopped");
            return Err(Error::Interrupted);
        }

        if code == 0 {
            self.reporter.long(format!(
                "Success! ({:.1} s)",
                started.elapsed().as_secs_f32()
            ));
            Ok(())
        } else {
            self.reporter.error(format!("Error ({code})"));
            let log = classifier.error_message().to_string();
            if !log.is_empty() {
                self.reporter.error(log.clone());
            }
            Err(Error::BuildFailed { code, log })
        }
    }

    /// Request the build to stop. Graceful termination first; the third
    /// request while the editor is still alive force-kills it.
    pub fn stop(&self) {
        self.interrupt.set();
        let requests = self.stop_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let process = self.process.lock().unwrap().clone();
        if let Some(process) = process {
            if requests >= KILL_AFTER_STOP_REQUESTS {
                process.kill();
            } else {
                process.terminate();
            }
        }
    }
}

impl Stoppable for UnityBuilder {
    fn stop(&self) {
        UnityBuilder::stop(self)
    }
}
