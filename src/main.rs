use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobcraft_catalog::FsCatalog;
use jobcraft_compiler::{Compiler, StandardCompiler};
use jobcraft_runtime::{Executor, ExecutorConfig, HandlerBackend, JobRunHandler, PipelineRunner};
use jobcraft_store::{RunStatus, RunStore, SqliteStore};

/// Jobcraft - a declarative job-execution engine
#[derive(Parser)]
#[command(name = "jobcraft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.jobcraft)
  #[arg(long, global = true, env = "JOBCRAFT_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Attempts per step for handler failures
  #[arg(long, global = true, env = "JOBCRAFT_MAX_ATTEMPTS")]
  max_attempts: Option<u32>,

  /// Maximum nesting depth for job.run and sub-pipelines
  #[arg(long, global = true, env = "JOBCRAFT_MAX_DEPTH")]
  max_depth: Option<usize>,

  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a job or pipeline
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Compile-check a job definition without running it
  Validate {
    /// Path to the job file (JSON or YAML)
    job_file: PathBuf,
  },

  /// Inspect recorded runs
  Runs {
    #[command(subcommand)]
    command: RunsCommand,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run a single job
  Job {
    /// Path to the job file (JSON or YAML)
    job_file: PathBuf,

    /// Payload as JSON (default: read from stdin)
    #[arg(long)]
    payload: Option<String>,
  },

  /// Run a pipeline of jobs and sub-pipelines
  Pipeline {
    /// Path to the pipeline file (JSON or YAML)
    pipeline_file: PathBuf,

    /// Payload as JSON (default: read from stdin)
    #[arg(long)]
    payload: Option<String>,
  },
}

#[derive(Subcommand)]
enum RunsCommand {
  /// Print a recorded run
  Show { run_id: String },

  /// List the runs of a job, most recent first
  List { job_id: String },
}

/// Everything a command needs to know about where state lives and how to run.
struct Settings {
  data_dir: PathBuf,
  config: ExecutorConfig,
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  init_tracing(cli.verbose);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory, pass --data-dir")?
      .join(".jobcraft"),
  };

  let mut config = ExecutorConfig::default();
  if let Some(max_attempts) = cli.max_attempts {
    config = config.with_max_attempts(max_attempts);
  }
  if let Some(max_depth) = cli.max_depth {
    config = config.with_max_depth(max_depth);
  }

  let ctx = Settings { data_dir, config };

  let Some(command) = cli.command else {
    println!("jobcraft - use --help to see available commands");
    return Ok(ExitCode::SUCCESS);
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Run { target } => match target {
        RunTarget::Job { job_file, payload } => run_job(&ctx, &job_file, payload).await,
        RunTarget::Pipeline {
          pipeline_file,
          payload,
        } => run_pipeline(&ctx, &pipeline_file, payload).await,
      },
      Commands::Validate { job_file } => validate(&job_file),
      Commands::Runs { command } => match command {
        RunsCommand::Show { run_id } => show_run(&ctx, &run_id).await,
        RunsCommand::List { job_id } => list_runs(&ctx, &job_id).await,
      },
    }
  })
}

const CRATES: &[&str] = &[
  "jobcraft",
  "jobcraft_config",
  "jobcraft_job",
  "jobcraft_compiler",
  "jobcraft_store",
  "jobcraft_catalog",
  "jobcraft_runtime",
];

/// Directives used when `RUST_LOG` is unset: every jobcraft crate at info,
/// or debug with `--verbose`, and everything else one level quieter.
fn default_filter(verbose: bool) -> String {
  let (ours, rest) = if verbose {
    ("debug", "info")
  } else {
    ("info", "warn")
  };
  let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{}={}", c, ours)).collect();
  directives.push(rest.to_string());
  directives.join(",")
}

fn init_tracing(verbose: bool) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .with_target(true)
    .init();
}

async fn run_job(ctx: &Settings, job_file: &Path, payload: Option<String>) -> Result<ExitCode> {
  let def = jobcraft_config::load_job(job_file)
    .with_context(|| format!("failed to load job file: {}", job_file.display()))?;

  eprintln!("Loaded job: {} (version {})", def.job_id, def.version);

  let payload = read_payload(payload)?;
  let executor = build_executor(ctx).await?;
  let cancel = cancel_on_ctrl_c();

  let record = executor
    .run_job(&def, payload, cancel)
    .await
    .context("job execution failed")?;

  eprintln!("Run {} finished: {}", record.run_id, record.status);
  println!("{}", serde_json::to_string_pretty(&record)?);

  Ok(exit_code(record.status))
}

async fn run_pipeline(
  ctx: &Settings,
  pipeline_file: &Path,
  payload: Option<String>,
) -> Result<ExitCode> {
  let def = jobcraft_config::load_pipeline(pipeline_file)
    .with_context(|| format!("failed to load pipeline file: {}", pipeline_file.display()))?;

  eprintln!(
    "Loaded pipeline: {} ({} entries)",
    def.pipeline_id,
    def.entries.len()
  );

  let payload = read_payload(payload)?;
  let executor = Arc::new(build_executor(ctx).await?);
  let runner = PipelineRunner::new(executor, Arc::new(catalog(ctx)));
  let cancel = cancel_on_ctrl_c();

  let result = runner
    .run(&def, payload, cancel)
    .await
    .context("pipeline execution failed")?;

  eprintln!("Pipeline {} finished: {}", result.pipeline_id, result.status);
  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(exit_code(result.status))
}

fn validate(job_file: &Path) -> Result<ExitCode> {
  let def = jobcraft_config::load_job(job_file)
    .with_context(|| format!("failed to load job file: {}", job_file.display()))?;

  StandardCompiler::new()
    .validate(&def)
    .with_context(|| format!("job '{}' is invalid", def.job_id))?;

  eprintln!("Job {} is valid ({} steps)", def.job_id, def.steps.len());
  Ok(ExitCode::SUCCESS)
}

async fn show_run(ctx: &Settings, run_id: &str) -> Result<ExitCode> {
  let store = open_store(ctx).await?;
  let record = store
    .get_run(run_id)
    .await
    .with_context(|| format!("failed to read run {}", run_id))?;

  println!("{}", serde_json::to_string_pretty(&record)?);
  Ok(ExitCode::SUCCESS)
}

async fn list_runs(ctx: &Settings, job_id: &str) -> Result<ExitCode> {
  let store = open_store(ctx).await?;
  let records = store
    .list_runs(job_id)
    .await
    .with_context(|| format!("failed to list runs of job {}", job_id))?;

  let summary: Vec<serde_json::Value> = records
    .iter()
    .map(|r| {
      serde_json::json!({
        "run_id": r.run_id,
        "status": r.status,
        "started_at": r.started_at,
        "completed_at": r.completed_at,
      })
    })
    .collect();

  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(ExitCode::SUCCESS)
}

async fn open_store(ctx: &Settings) -> Result<SqliteStore> {
  tokio::fs::create_dir_all(&ctx.data_dir)
    .await
    .with_context(|| format!("failed to create data dir: {}", ctx.data_dir.display()))?;

  let path = ctx.data_dir.join("runs.db");
  SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open run store: {}", path.display()))
}

fn catalog(ctx: &Settings) -> FsCatalog {
  FsCatalog::new(ctx.data_dir.join("catalog"))
}

async fn build_executor(ctx: &Settings) -> Result<Executor> {
  let store = open_store(ctx).await?;
  let job_run = JobRunHandler::new(Arc::new(catalog(ctx)));

  Ok(
    Executor::builder(Arc::new(store))
      .handler(HandlerBackend::Orchestration, Arc::new(job_run))
      .callable_fn("echo", |params| Ok(params.clone()))
      .config(ctx.config.clone())
      .build(),
  )
}

/// Cancel the returned token on the first Ctrl-C. The executor stops between steps.
fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupt received, cancelling run");
      token.cancel();
    }
  });
  cancel
}

fn exit_code(status: RunStatus) -> ExitCode {
  match status {
    RunStatus::Success | RunStatus::Partial => ExitCode::SUCCESS,
    RunStatus::Failed | RunStatus::Cancelled => ExitCode::FAILURE,
  }
}

fn read_payload(arg: Option<String>) -> Result<serde_json::Value> {
  match arg {
    Some(raw) => serde_json::from_str(&raw).context("failed to parse --payload JSON"),
    None => read_payload_from_stdin(),
  }
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_filter_covers_every_crate() {
    let quiet = default_filter(false);
    let verbose = default_filter(true);
    for krate in CRATES {
      assert!(quiet.contains(&format!("{}=info", krate)));
      assert!(verbose.contains(&format!("{}=debug", krate)));
    }
    assert!(quiet.ends_with(",warn"));
    assert!(verbose.ends_with(",info"));
    assert!(EnvFilter::try_new(&verbose).is_ok());
  }

  #[test]
  fn test_verbose_flag_parses() {
    let cli = Cli::try_parse_from(["jobcraft", "--verbose", "validate", "job.yaml"]).unwrap();
    assert!(cli.verbose);
  }
}
