//! CLI command definitions for runguard.
//!
//! Every pipeline step process calls into this binary to record its
//! progress in the run document under `<project>/outputs/<run_id>/`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::driver::{init_run, run_review, ReviewOutcome};
use crate::logging::run_log_path;
use crate::manifest::{
    default_run_id, read_manifest, validate_run_id, RunManifest, RunStatus, RunStore,
    MANIFEST_FILE_NAME,
};
use crate::quality::{QualityGate, Thresholds};
use crate::resume::{latest_run, next_step, run_dir, PIPELINE_STEPS};

/// Message recorded by `step fail` when none is given.
const DEFAULT_FAIL_MESSAGE: &str = "step failed";

/// Run-state tracking and data-quality gating for pipeline steps.
#[derive(Parser, Debug)]
#[command(name = "runguard")]
#[command(about = "Track multi-step pipeline runs and gate event-log quality")]
#[command(version)]
#[command(
    long_about = "runguard records each pipeline step of a run in outputs/<run_id>/run_manifest.json, fingerprints the files steps consume and produce, evaluates event-log quality during review, and tells you where to resume.\n\nExample usage:\n  runguard step start ingest\n  runguard --run-id 20240101-120000 register --inputs data/events.csv\n  runguard --run-id 20240101-120000 review"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Project directory holding runguard.yaml and outputs/.
    #[arg(short, long, default_value = ".", global = true, env = "RUNGUARD_PROJECT")]
    pub project: PathBuf,

    /// Run to operate on. Defaults to a new run for `step start` and
    /// `review`, and to the latest run otherwise.
    #[arg(short, long, global = true, env = "RUNGUARD_RUN_ID")]
    pub run_id: Option<String>,

    /// Configuration file (defaults to <project>/runguard.yaml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Show the latest run and the recommended next step.
    Status(StatusArgs),

    /// Print the next pipeline step to run.
    Next,

    /// Record step lifecycle transitions.
    Step(StepArgs),

    /// Register files consumed or produced by a step.
    Register(RegisterArgs),

    /// Run the data-quality review step.
    Review(ReviewArgs),
}

/// Arguments for `runguard status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output JSON instead of text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Step entrypoint arguments.
#[derive(Parser, Debug)]
pub struct StepArgs {
    #[command(subcommand)]
    pub command: StepSubcommand,
}

/// Step lifecycle subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum StepSubcommand {
    /// Mark a step started (creates the run if needed).
    Start { name: String },

    /// Mark a step completed.
    Complete { name: String },

    /// Mark a step and the run failed.
    Fail {
        name: String,

        /// Failure message recorded on the step.
        #[arg(short, long, default_value = DEFAULT_FAIL_MESSAGE)]
        message: String,
    },
}

/// Arguments for `runguard register`.
#[derive(Parser, Debug)]
pub struct RegisterArgs {
    /// Files or directories the step consumed.
    #[arg(long, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Files or directories the step produced.
    #[arg(long, num_args = 1..)]
    pub outputs: Vec<PathBuf>,
}

/// Arguments for `runguard review`.
#[derive(Parser, Debug)]
pub struct ReviewArgs {
    /// Event log CSV (defaults to the first file connector path in config).
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Complete the run even when blocking issues are found.
    #[arg(long)]
    pub allow_blocking: bool,

    /// Maximum missing-value rate per column.
    #[arg(long)]
    pub missing_threshold: Option<f64>,

    /// Maximum duplicate-event rate.
    #[arg(long)]
    pub duplicate_threshold: Option<f64>,

    /// Maximum order-violation rate.
    #[arg(long)]
    pub order_threshold: Option<f64>,

    /// Maximum timestamp parse-failure rate.
    #[arg(long)]
    pub parse_threshold: Option<f64>,

    /// Output the quality report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl ReviewArgs {
    fn apply(&self, mut thresholds: Thresholds) -> Thresholds {
        if let Some(v) = self.missing_threshold {
            thresholds.missing_value = v;
        }
        if let Some(v) = self.duplicate_threshold {
            thresholds.duplicate = v;
        }
        if let Some(v) = self.order_threshold {
            thresholds.order_violation = v;
        }
        if let Some(v) = self.parse_threshold {
            thresholds.parse_failure = v;
        }
        thresholds
    }
}

impl Cli {
    /// Fills in `run_id` when the command targets a run and none was given:
    /// a fresh ID for commands that may start a run, the latest run otherwise.
    pub fn resolve_run_id(&mut self) {
        if self.run_id.is_some() {
            return;
        }
        self.run_id = match &self.command {
            Commands::Step(StepArgs {
                command: StepSubcommand::Start { .. },
            })
            | Commands::Review(_) => Some(default_run_id()),
            Commands::Step(_) | Commands::Register(_) | Commands::Next => {
                match latest_run(&self.project) {
                    Ok(found) => found.map(|m| m.run_id),
                    Err(err) => {
                        warn!(error = %err, "Could not determine latest run");
                        None
                    }
                }
            }
            Commands::Status(_) => None,
        };
    }
}

/// Parse CLI arguments and resolve the target run.
///
/// This allows main.rs to set up per-run logging before running commands.
pub fn parse_cli() -> Cli {
    let mut cli = Cli::parse();
    cli.resolve_run_id();
    cli
}

/// Per-run log file for commands that operate on a run.
///
/// Commands that only touch existing runs never create a run directory for
/// their log.
pub fn run_log_target(cli: &Cli) -> Option<PathBuf> {
    let run_id = cli.run_id.as_deref()?;
    validate_run_id(run_id).ok()?;
    let dir = run_dir(&cli.project, run_id);
    match cli.command {
        Commands::Status(_) | Commands::Next => None,
        Commands::Step(StepArgs {
            command: StepSubcommand::Start { .. },
        })
        | Commands::Review(_) => Some(run_log_path(&dir)),
        _ => dir.is_dir().then(|| run_log_path(&dir)),
    }
}

/// Run the CLI with the parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref(), &cli.project)
        .context("Failed to load configuration")?;

    match &cli.command {
        Commands::Status(args) => run_status_command(&cli, &config, args),
        Commands::Next => run_next_command(&cli),
        Commands::Step(args) => run_step_command(&cli, &config, args),
        Commands::Register(args) => run_register_command(&cli, args),
        Commands::Review(args) => run_review_command(&cli, &config, args),
    }
}

// ============================================================================
// Status and resume
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusOutput {
    project: String,
    run_id: Option<String>,
    status: Option<RunStatus>,
    next_step: Option<String>,
}

fn project_name(cli: &Cli, config: &Config) -> String {
    if !config.project.name.is_empty() {
        return config.project.name.clone();
    }
    let canonical = cli.project.canonicalize().unwrap_or_else(|_| cli.project.clone());
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| canonical.display().to_string())
}

fn run_status_command(cli: &Cli, config: &Config, args: &StatusArgs) -> anyhow::Result<()> {
    let manifest = match cli.run_id.as_deref() {
        Some(id) => Some(load_run(&cli.project, id)?),
        None => latest_run(&cli.project).context("Failed to read latest run")?,
    };

    let output = StatusOutput {
        project: project_name(cli, config),
        run_id: manifest.as_ref().map(|m| m.run_id.clone()),
        status: manifest.as_ref().map(|m| m.status),
        next_step: recommended_step(manifest.as_ref()).map(str::to_string),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Project: {}", output.project);
    match (&output.run_id, output.status) {
        (Some(id), Some(status)) => {
            println!("Latest run: {}", id);
            println!("Status: {}", status);
        }
        _ => println!("Latest run: none"),
    }
    println!("Next step: {}", output.next_step.as_deref().unwrap_or("none"));
    Ok(())
}

fn run_next_command(cli: &Cli) -> anyhow::Result<()> {
    let manifest = match cli.run_id.as_deref() {
        Some(id) => Some(load_run(&cli.project, id)?),
        None => None,
    };
    println!("{}", recommended_step(manifest.as_ref()).unwrap_or(""));
    Ok(())
}

/// With no run yet the pipeline starts from its first step.
fn recommended_step(manifest: Option<&RunManifest>) -> Option<&'static str> {
    match manifest {
        Some(manifest) => next_step(manifest),
        None => PIPELINE_STEPS.first().copied(),
    }
}

// ============================================================================
// Step lifecycle
// ============================================================================

fn run_step_command(cli: &Cli, config: &Config, args: &StepArgs) -> anyhow::Result<()> {
    let run_id = required_run_id(cli)?;
    match &args.command {
        StepSubcommand::Start { name } => {
            if !PIPELINE_STEPS.contains(&name.as_str()) {
                warn!(step = %name, "Step is not part of the standard pipeline");
            }
            let store = init_run(&cli.project, Some(run_id), config)?;
            store.start_step(name)?;
            println!("{}", store.run_id());
        }
        StepSubcommand::Complete { name } => {
            let store = open_run(&cli.project, run_id)?;
            store.complete_step(name)?;
            let manifest = store.manifest()?;
            if next_step(&manifest).is_none() && manifest.status != RunStatus::Completed {
                store.set_status(RunStatus::Completed)?;
                info!(run_id, "All pipeline steps completed");
            }
        }
        StepSubcommand::Fail { name, message } => {
            let store = open_run(&cli.project, run_id)?;
            store.fail_step(name, message)?;
            store.set_status(RunStatus::Failed)?;
        }
    }
    Ok(())
}

fn run_register_command(cli: &Cli, args: &RegisterArgs) -> anyhow::Result<()> {
    if args.inputs.is_empty() && args.outputs.is_empty() {
        bail!("Nothing to register: pass --inputs and/or --outputs");
    }
    let store = open_run(&cli.project, required_run_id(cli)?)?;
    store.add_inputs(&args.inputs).context("Failed to register inputs")?;
    store.add_outputs(&args.outputs).context("Failed to register outputs")?;

    let manifest = store.manifest()?;
    info!(
        run_id = %store.run_id(),
        inputs = manifest.inputs.len(),
        outputs = manifest.outputs.len(),
        "Files registered"
    );
    Ok(())
}

// ============================================================================
// Review
// ============================================================================

fn run_review_command(cli: &Cli, config: &Config, args: &ReviewArgs) -> anyhow::Result<()> {
    let thresholds = args.apply(config.quality.thresholds);
    thresholds.validate()?;

    let log_path = match args.log.as_deref().or_else(|| config.active_log_path()) {
        Some(path) => resolve_path(&cli.project, path),
        None => bail!("No event log given: pass --log or configure a file connector"),
    };

    let gate = QualityGate::new(config.quality.columns(), thresholds)
        .with_timestamp_format(config.quality.timestamp_format());
    let store = init_run(&cli.project, Some(required_run_id(cli)?), config)?;
    let outcome = run_review(&store, &log_path, &gate, args.allow_blocking)?;

    let report = &outcome.gate().report;
    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("Run: {}", store.run_id());
        println!("Rows: {}", report.row_count);
        println!("Warnings: {}", report.warnings.len());
        println!("Blocking issues: {}", report.blocking_issues.len());
        println!("Artifacts: {}", outcome.artifacts().dir.display());
    }

    if let ReviewOutcome::Blocked { gate, .. } = &outcome {
        bail!(
            "Review blocked by {} issue(s): {}",
            gate.report.blocking_issues.len(),
            gate.report.blocking_issues.join("; ")
        );
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn required_run_id(cli: &Cli) -> anyhow::Result<&str> {
    cli.run_id
        .as_deref()
        .context("No run found: pass --run-id or start a step first")
}

/// Opens an existing run without creating one.
fn open_run(project: &Path, run_id: &str) -> anyhow::Result<RunStore> {
    let dir = run_dir(project, run_id);
    if !dir.join(MANIFEST_FILE_NAME).is_file() {
        bail!("Run '{}' not found under {}", run_id, dir.display());
    }
    let (store, _) = RunStore::open(run_id, &dir)?;
    Ok(store)
}

fn load_run(project: &Path, run_id: &str) -> anyhow::Result<RunManifest> {
    validate_run_id(run_id)?;
    let path = run_dir(project, run_id).join(MANIFEST_FILE_NAME);
    read_manifest(&path).with_context(|| format!("Failed to read run '{}'", run_id))
}

fn resolve_path(project: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project.join(path)
    }
}
