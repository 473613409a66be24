//! In-process cron trigger.
//!
//! Registers every active job's cron expression with a [`JobScheduler`] and
//! runs it through the orchestrator with source `scheduled`. The distributed
//! lock still guards each run, so several server instances may all schedule
//! the same job safely.

use pricewatch_core::{ExecutionSource, JobConfig, Parameters};
use pricewatch_db::RpcJobLock;
use pricewatch_jobs::Orchestrator;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    orchestrator: Orchestrator<RpcJobLock>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let configs: Vec<JobConfig> = orchestrator
        .registry()
        .get_active_jobs()
        .into_iter()
        .cloned()
        .collect();
    for config in &configs {
        register_job(&scheduler, orchestrator.clone(), config).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_job(
    scheduler: &JobScheduler,
    orchestrator: Orchestrator<RpcJobLock>,
    config: &JobConfig,
) -> Result<(), JobSchedulerError> {
    let cron = with_seconds_field(&config.cron_expression);
    let job_id = config.job_id.clone();

    let job = Job::new_async(cron.as_str(), move |uuid, _lock| {
        let orchestrator = orchestrator.clone();
        let job_id = job_id.clone();

        Box::pin(async move {
            run_scheduled(&orchestrator, &job_id, uuid).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(job_id = %config.job_id, cron = %cron, "scheduler: registered job");
    Ok(())
}

async fn run_scheduled(orchestrator: &Orchestrator<RpcJobLock>, job_id: &str, tick: Uuid) {
    let request_id = format!("cron-{tick}");
    match orchestrator
        .execute_job(
            job_id,
            &request_id,
            ExecutionSource::Scheduled,
            &Parameters::new(),
        )
        .await
    {
        Ok(run) => tracing::info!(
            job_id,
            run_id = %run.run_id,
            success = run.result.success,
            "scheduler: run complete"
        ),
        Err(e) => tracing::error!(
            job_id,
            run_id = e.run_id().unwrap_or("-"),
            error = %e,
            "scheduler: run failed"
        ),
    }
}

/// The scheduler wants a leading seconds field; job definitions use the
/// classic five-field form.
fn with_seconds_field(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}
