//! Run lifecycle: lookup, circuit gate, distributed lock, bounded handler
//! execution, settle, release.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pricewatch_core::{
    ExecutionSource, JobExecutionContext, JobKind, JobRegistry, JobResult, Parameters,
};
use pricewatch_db::JobLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry};
use crate::error::EngineError;
use crate::handlers::{run_handler, JobDeps};

/// A run that completed (or was skipped because another owner holds the
/// lock).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub job_id: String,
    pub run_id: String,
    pub execution_id: String,
    pub result: JobResult,
}

/// Executes registered jobs. Cheap to clone; all state is shared.
pub struct Orchestrator<L> {
    registry: Arc<JobRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    lock: Arc<L>,
    deps: Arc<JobDeps>,
}

impl<L> Clone for Orchestrator<L> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            breakers: Arc::clone(&self.breakers),
            lock: Arc::clone(&self.lock),
            deps: Arc::clone(&self.deps),
        }
    }
}

enum Settled {
    Finished(JobResult),
    TimedOut(JobResult),
}

impl<L: JobLock> Orchestrator<L> {
    #[must_use]
    pub fn new(
        registry: Arc<JobRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        lock: Arc<L>,
        deps: Arc<JobDeps>,
    ) -> Self {
        Self {
            registry,
            breakers,
            lock,
            deps,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Runs `job_id` once.
    ///
    /// Lock contention is not an error: the returned run carries a
    /// successful result with a `job_locked` warning and the handler is never
    /// invoked. When the lock RPC itself is unavailable the run proceeds
    /// without mutual exclusion.
    ///
    /// Everything after the gate checks (lock, handler, settle, breaker
    /// update, release) runs in its own task, so dropping the returned future
    /// does not leave the lock held or the breaker unaware of the outcome.
    ///
    /// On timeout the handler task keeps running in the background with its
    /// cancellation token tripped, and may still write its execution log
    /// after this returns.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] / [`EngineError::Disabled`] /
    ///   [`EngineError::CircuitOpen`] before any lock or handler work.
    /// - [`EngineError::Timeout`] / [`EngineError::Failed`] after the
    ///   circuit breaker was updated and the lock released.
    pub async fn execute_job(
        &self,
        job_id: &str,
        request_id: &str,
        source: ExecutionSource,
        overrides: &Parameters,
    ) -> Result<JobRun, EngineError> {
        let config = self
            .registry
            .get_job_config(job_id)
            .ok_or_else(|| EngineError::NotFound(job_id.to_string()))?;
        if !config.active {
            return Err(EngineError::Disabled(job_id.to_string()));
        }

        let breaker = self
            .breakers
            .get_or_create(&config.circuit_key(), config.circuit_breaker_threshold);
        if !breaker.allow_request() {
            tracing::warn!(job_id, "circuit breaker open; run refused");
            return Err(EngineError::CircuitOpen(job_id.to_string()));
        }

        let ctx = self
            .registry
            .create_execution_context(job_id, request_id, source, overrides)
            .ok_or_else(|| EngineError::NotFound(job_id.to_string()))?;
        let run_id = ctx.run_id.clone();
        let execution_id = ctx.execution_id.clone();

        tracing::info!(
            job_id,
            run_id = %run_id,
            request_id,
            source = %source,
            kind = %config.kind,
            "job run starting"
        );

        let attempt = Attempt {
            kind: config.kind,
            timeout_ms: config.timeout_ms,
            lock_seconds: config.lock_seconds(),
            ctx,
            breaker,
            lock: Arc::clone(&self.lock),
            deps: Arc::clone(&self.deps),
        };

        match tokio::spawn(attempt.run().in_current_span()).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                tracing::error!(job_id, run_id = %run_id, error = %join_err, "job lifecycle task aborted");
                Err(EngineError::Failed {
                    job_id: job_id.to_string(),
                    run_id,
                    execution_id,
                    result: Box::new(JobResult::failure(
                        format!("Lifecycle aborted: {join_err}"),
                        0,
                    )),
                })
            }
        }
    }
}

/// One admitted run. Owns everything the lock-to-release span needs.
struct Attempt<L> {
    kind: JobKind,
    timeout_ms: u64,
    lock_seconds: u64,
    ctx: JobExecutionContext,
    breaker: Arc<CircuitBreaker>,
    lock: Arc<L>,
    deps: Arc<JobDeps>,
}

impl<L: JobLock> Attempt<L> {
    async fn run(self) -> Result<JobRun, EngineError> {
        let job_id = self.ctx.job_id.clone();
        let run_id = self.ctx.run_id.clone();
        let execution_id = self.ctx.execution_id.clone();

        match self
            .lock
            .acquire(&job_id, self.lock_seconds, &execution_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(job_id = %job_id, run_id = %run_id, "job already running elsewhere; skipped");
                return Ok(JobRun {
                    job_id,
                    run_id,
                    execution_id,
                    result: JobResult::skipped_locked(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    run_id = %run_id,
                    error = %e,
                    "job lock unavailable; running without mutual exclusion"
                );
            }
        }

        let started = Instant::now();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            run_handler(self.kind, self.ctx, Arc::clone(&self.deps), cancel.clone())
                .in_current_span(),
        );

        let settled = match tokio::time::timeout(Duration::from_millis(self.timeout_ms), handle)
            .await
        {
            Ok(Ok(result)) => Settled::Finished(result),
            Ok(Err(join_err)) => {
                tracing::error!(job_id = %job_id, run_id = %run_id, error = %join_err, "job handler panicked");
                Settled::Finished(JobResult::failure(
                    format!("Handler aborted: {join_err}"),
                    elapsed_ms(started),
                ))
            }
            Err(_) => {
                cancel.cancel();
                tracing::error!(
                    job_id = %job_id,
                    run_id = %run_id,
                    timeout_ms = self.timeout_ms,
                    "job timed out; handler left to finish in the background"
                );
                Settled::TimedOut(JobResult::failure(
                    format!("Job timeout after {}ms", self.timeout_ms),
                    elapsed_ms(started),
                ))
            }
        };

        match &settled {
            Settled::Finished(result) if result.success => self.breaker.record_success(),
            _ => self.breaker.record_failure(),
        }

        if let Err(e) = self.lock.release(&job_id, &execution_id).await {
            tracing::warn!(job_id = %job_id, run_id = %run_id, error = %e, "failed to release job lock");
        }

        match settled {
            Settled::Finished(result) if result.success => Ok(JobRun {
                job_id,
                run_id,
                execution_id,
                result,
            }),
            Settled::Finished(result) => Err(EngineError::Failed {
                job_id,
                run_id,
                execution_id,
                result: Box::new(result),
            }),
            Settled::TimedOut(result) => Err(EngineError::Timeout {
                job_id,
                run_id,
                execution_id,
                timeout_ms: self.timeout_ms,
                result: Box::new(result),
            }),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
