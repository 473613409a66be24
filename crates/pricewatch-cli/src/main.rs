use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use pricewatch_core::{ExecutionSource, JobRegistry, Parameters};
use pricewatch_db::{RpcJobLock, StoreClient};
use pricewatch_jobs::{CircuitBreakerRegistry, CircuitDefaults, JobDeps, Orchestrator};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pricewatch-cli")]
#[command(about = "Run and inspect pricewatch cron jobs")]
struct Cli {
    /// YAML job table replacing the built-in jobs.
    #[arg(long, global = true, env = "PRICEWATCH_JOBS_PATH")]
    jobs_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the job table.
    List {
        /// Include inactive jobs.
        #[arg(long)]
        all: bool,
    },
    /// Run one job now and print its result as JSON.
    Run {
        job_id: String,
        /// Parameter override, `key=value`. Values are parsed as JSON when
        /// possible, otherwise taken as strings.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
        #[arg(long, value_enum, default_value_t = RunSource::Manual)]
        source: RunSource,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunSource {
    Manual,
    Recovery,
}

impl From<RunSource> for ExecutionSource {
    fn from(source: RunSource) -> Self {
        match source {
            RunSource::Manual => ExecutionSource::Manual,
            RunSource::Recovery => ExecutionSource::Recovery,
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter name is empty in {raw:?}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load_registry(path: Option<&Path>) -> anyhow::Result<JobRegistry> {
    Ok(match path {
        Some(path) => JobRegistry::load(path)?,
        None => JobRegistry::builtin(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List { all } => {
            let registry = load_registry(cli.jobs_path.as_deref())?;
            list_jobs(&registry, all);
        }
        Commands::Run {
            job_id,
            params,
            source,
        } => {
            run_job(cli.jobs_path, &job_id, params, source.into()).await?;
        }
    }

    Ok(())
}

fn list_jobs(registry: &JobRegistry, all: bool) {
    println!(
        "{:<26} {:<12} {:<16} {:>4} {:>9}  active",
        "job_id", "type", "cron", "prio", "timeout"
    );
    for config in registry.get_all_job_configs() {
        if !all && !config.active {
            continue;
        }
        println!(
            "{:<26} {:<12} {:<16} {:>4} {:>8}s  {}",
            config.job_id,
            config.job_type,
            config.cron_expression,
            config.priority,
            config.timeout_ms / 1000,
            if config.active { "yes" } else { "no" }
        );
    }
}

async fn run_job(
    jobs_path: Option<PathBuf>,
    job_id: &str,
    params: Vec<(String, Value)>,
    source: ExecutionSource,
) -> anyhow::Result<()> {
    let config = pricewatch_core::load_app_config()?;
    let registry = load_registry(jobs_path.or_else(|| config.jobs_path.clone()).as_deref())?;
    let store = StoreClient::from_app_config(&config)?;
    let orchestrator = Orchestrator::new(
        Arc::new(registry),
        Arc::new(CircuitBreakerRegistry::new(CircuitDefaults::from_app_config(
            &config,
        ))),
        Arc::new(RpcJobLock::new(store.clone())),
        Arc::new(JobDeps::new(store)),
    );

    let overrides: Parameters = params.into_iter().collect();
    let request_id = format!("cli-{}", uuid::Uuid::new_v4());

    match orchestrator
        .execute_job(job_id, &request_id, source, &overrides)
        .await
    {
        Ok(run) => {
            println!("{}", serde_json::to_string_pretty(&run)?);
            Ok(())
        }
        Err(e) => {
            if let Some(result) = e.result() {
                eprintln!("{}", serde_json::to_string_pretty(result)?);
            }
            let run_id = e.run_id().unwrap_or("-").to_string();
            Err(anyhow::Error::new(e).context(format!("job {job_id} failed (run {run_id})")))
        }
    }
}
