//! parbuild CLI
//!
//! Entry point for the `parbuild` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};

use parbuild::process::probe_tool;
use parbuild::{Config, Event, EventSink, Orchestrator, Reporter, RunOutcome};

#[derive(Parser)]
#[command(name = "parbuild")]
#[command(about = "Unattended Unity batch-mode build lane", version)]
struct Cli {
    /// Configuration file (default: the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a configured project
    Build {
        /// Project name from the configuration file
        project: String,

        /// Rebuild whenever the source changes, until stopped
        #[arg(long, short = 'c')]
        continuous: bool,
    },

    /// Probe the external tools builds depend on
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List configured projects
    Projects {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove leftover working copies from interrupted runs
    Clean,
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Build {
            project,
            continuous,
        } => run_build(cli.config, &project, continuous),
        Commands::Check { json } => run_check(json),
        Commands::Projects { json } => run_projects(cli.config, json),
        Commands::Clean => run_clean(),
    };
    process::exit(code);
}

/// Console event sink: long messages to stdout, errors to stderr, stage
/// transitions with a timestamp. Short messages are for constrained
/// displays; the console already shows the full lines.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::Started(name) => {
                println!("\n[{}] > {name}", Local::now().format("%H:%M:%S"));
            }
            Event::Ended(name) => {
                println!("[{}] > {name} finished", Local::now().format("%H:%M:%S"));
            }
            Event::LongMessage(text) => println!("{text}"),
            Event::ErrorMessage(text) => eprintln!("{text}"),
            Event::ShortMessage(_) => {}
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, i32> {
    let path = path.unwrap_or_else(Config::default_path);
    Config::from_file(&path).map_err(|e| {
        eprintln!("{e}");
        e.exit_code()
    })
}

fn run_build(config_path: Option<PathBuf>, project: &str, continuous: bool) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let reporter = Reporter::new(vec![Arc::new(ConsoleSink)]);
    let orchestrator = match Orchestrator::new(&config, project, reporter) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            eprintln!("{e}");
            return e.exit_code();
        }
    };

    // Each Ctrl-C forwards one stop request; if the editor resists
    // termination, repeating it drives the invoker's kill escalation.
    let stopper = Arc::clone(&orchestrator);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nStop requested, waiting for the current step...");
        stopper.stop();
    }) {
        eprintln!("cannot install signal handler: {e}");
    }

    let outcome = orchestrator.run(continuous);
    if let RunOutcome::Failed { message, .. } = &outcome {
        eprintln!("\nBuild failed: {message}");
    }
    outcome.exit_code()
}

fn run_check(json: bool) -> i32 {
    let tools = [
        ("git", "git sources", "https://git-scm.com/"),
        ("butler", "itch.io publishing", "https://itch.io/docs/butler/"),
    ];

    let mut missing = 0;
    let mut report = Vec::new();

    for (program, purpose, hint) in tools {
        match probe_tool(program, hint) {
            Ok(version) => {
                if !json {
                    println!("[ok] {program}: {version}");
                }
                report.push(serde_json::json!({
                    "name": program,
                    "purpose": purpose,
                    "found": true,
                    "version": version,
                }));
            }
            Err(e) => {
                missing += 1;
                if !json {
                    println!("[missing] {e}");
                }
                report.push(serde_json::json!({
                    "name": program,
                    "purpose": purpose,
                    "found": false,
                    "error": e.to_string(),
                }));
            }
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "tools": report }))
                .expect("serializable report")
        );
    }

    if missing == 0 {
        0
    } else {
        1
    }
}

fn run_projects(config_path: Option<PathBuf>, json: bool) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    if json {
        match serde_json::to_string_pretty(&config.projects) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("Error serializing projects: {e}");
                return 1;
            }
        }
        return 0;
    }

    if config.projects.is_empty() {
        println!("No projects configured.");
        return 0;
    }

    for project in &config.projects {
        println!(
            "{} ({:?} source, target {})",
            project.name,
            project.source.kind,
            project.build.target.player_flag_name()
        );
    }
    0
}

fn run_clean() -> i32 {
    match parbuild::fsops::sweep_leftovers(&std::env::temp_dir()) {
        Ok(0) => {
            println!("No leftover working copies.");
            0
        }
        Ok(swept) => {
            println!("Removed {swept} leftover working cop{}.", if swept == 1 { "y" } else { "ies" });
            0
        }
        Err(e) => {
            eprintln!("Error sweeping temp directory: {e}");
            1
        }
    }
}
