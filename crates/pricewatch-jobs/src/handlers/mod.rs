//! Job bodies and the dispatch over [`JobKind`].
//!
//! Every handler follows the same outline: validate the context and the
//! store environment (no side effects on failure), do the work, then write
//! exactly one execution log describing the outcome.

mod daily_price_update;
mod maintenance_cleanup;
mod realtime_change_alerts;
mod weekly_trend_analysis;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use pricewatch_core::{JobExecutionContext, JobKind, JobResult};
use pricewatch_db::{StoreClient, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::logger::{ExecutionLogEntry, ExecutionLogger, LogStatus};
use crate::validation::{validate_context, validate_env};

/// Collaborators shared by every handler.
#[derive(Debug, Clone)]
pub struct JobDeps {
    pub store: StoreClient,
    pub logger: ExecutionLogger,
}

impl JobDeps {
    #[must_use]
    pub fn new(store: StoreClient) -> Self {
        let logger = ExecutionLogger::new(store.clone());
        Self { store, logger }
    }
}

/// An error that aborts a handler body. Becomes a `fallido` log and a
/// failed [`JobResult`].
#[derive(Debug, Error)]
pub(crate) enum HandlerError {
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("cancelled after timeout")]
    Cancelled,
}

impl HandlerError {
    pub(crate) fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| HandlerError::Store { context, source }
    }
}

/// Runs the handler for `kind`. Never fails: problems are reported through
/// the returned result.
pub async fn run_handler(
    kind: JobKind,
    ctx: JobExecutionContext,
    deps: Arc<JobDeps>,
    cancel: CancellationToken,
) -> JobResult {
    if let Err(reason) = validate_context(&ctx).and_then(|()| validate_env(&deps.store)) {
        tracing::warn!(job_id = %ctx.job_id, run_id = %ctx.run_id, %reason, "job input rejected");
        return JobResult::validation_failure(&reason);
    }

    let started = Instant::now();
    let outcome = match kind {
        JobKind::DailyPriceUpdate => daily_price_update::run(&ctx, &deps, &cancel).await,
        JobKind::WeeklyTrendAnalysis => weekly_trend_analysis::run(&ctx, &deps, &cancel).await,
        JobKind::RealtimeChangeAlerts => realtime_change_alerts::run(&ctx, &deps, &cancel).await,
        JobKind::MaintenanceCleanup => maintenance_cleanup::run(&ctx, &deps, &cancel).await,
    };

    finish(&ctx, &deps.logger, started, outcome).await
}

/// Outcome of a handler body before timing and logging are applied.
pub(crate) enum Outcome {
    Done(JobResult),
    Rejected(String),
}

async fn finish(
    ctx: &JobExecutionContext,
    logger: &ExecutionLogger,
    started: Instant,
    outcome: Result<Outcome, HandlerError>,
) -> JobResult {
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut result = match outcome {
        Ok(Outcome::Rejected(reason)) => {
            tracing::warn!(job_id = %ctx.job_id, run_id = %ctx.run_id, %reason, "job input rejected");
            return JobResult::validation_failure(&reason);
        }
        Ok(Outcome::Done(result)) => result,
        Err(e) => {
            tracing::error!(job_id = %ctx.job_id, run_id = %ctx.run_id, error = %e, "job failed");
            JobResult::failure(e.to_string(), 0)
        }
    };
    result.execution_time_ms = elapsed_ms;

    let status = status_for(&result);
    logger
        .write_execution_log(ExecutionLogEntry::for_result(
            ctx,
            &result,
            status,
            Utc::now(),
        ))
        .await;

    tracing::info!(
        job_id = %ctx.job_id,
        run_id = %ctx.run_id,
        estado = status.as_str(),
        elapsed_ms,
        processed = result.products_processed,
        "job finished"
    );

    result
}

fn status_for(result: &JobResult) -> LogStatus {
    match (result.success, result.errors.is_empty()) {
        (false, _) => LogStatus::Fallido,
        (true, true) => LogStatus::Exitoso,
        (true, false) => LogStatus::Parcial,
    }
}

/// Awaits `fut` unless `cancel` fires first, in which case the in-flight
/// call is dropped.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, HandlerError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(HandlerError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Rows gathered by [`fetch_paged`].
pub(crate) struct Paged<T> {
    pub rows: Vec<T>,
    pub truncated: bool,
}

/// Pulls `limit`/`offset` pages until a short page or `max_rows`.
///
/// Cancellation is observed before and during each page. Hitting `max_rows` on a full
/// page marks the result truncated.
pub(crate) async fn fetch_paged<T, F, Fut>(
    batch_size: usize,
    max_rows: usize,
    cancel: &CancellationToken,
    context: &'static str,
    mut fetch: F,
) -> Result<Paged<T>, HandlerError>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, StoreError>>,
{
    let mut rows = Vec::new();
    let mut truncated = false;

    loop {
        let limit = batch_size.max(1).min(max_rows - rows.len());
        let page = until_cancelled(cancel, fetch(limit, rows.len()))
            .await?
            .map_err(HandlerError::store(context))?;
        let received = page.len();
        rows.extend(page);

        if received < limit {
            break;
        }
        if rows.len() >= max_rows {
            truncated = true;
            break;
        }
    }

    Ok(Paged { rows, truncated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_success_and_errors() {
        let mut result = JobResult {
            success: true,
            ..JobResult::default()
        };
        assert_eq!(status_for(&result), LogStatus::Exitoso);

        result.errors.push("comparison failed".to_string());
        assert_eq!(status_for(&result), LogStatus::Parcial);

        result.success = false;
        assert_eq!(status_for(&result), LogStatus::Fallido);
    }

    #[tokio::test]
    async fn fetch_paged_stops_on_short_page() {
        let cancel = CancellationToken::new();
        let mut offsets = Vec::new();
        let paged = fetch_paged(2, 100, &cancel, "rows", |limit, offset| {
            offsets.push(offset);
            let page: Vec<usize> = (offset..(offset + limit).min(5)).collect();
            async move { Ok(page) }
        })
        .await
        .expect("paged");
        assert_eq!(paged.rows, vec![0, 1, 2, 3, 4]);
        assert!(!paged.truncated);
        assert_eq!(offsets, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn fetch_paged_truncates_at_max_rows() {
        let cancel = CancellationToken::new();
        let paged = fetch_paged(4, 6, &cancel, "rows", |limit, offset| {
            let page: Vec<usize> = (offset..offset + limit).collect();
            async move { Ok(page) }
        })
        .await
        .expect("paged");
        assert_eq!(paged.rows.len(), 6);
        assert!(paged.truncated);
    }

    #[tokio::test]
    async fn fetch_paged_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fetch_paged(4, 6, &cancel, "rows", |_, _| async {
            Ok::<Vec<u8>, StoreError>(Vec::new())
        })
        .await;
        assert!(matches!(result, Err(HandlerError::Cancelled)));
    }

    #[tokio::test]
    async fn until_cancelled_drops_an_in_flight_call() {
        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trip.cancel();
        });

        let outcome = until_cancelled(&cancel, std::future::pending::<()>()).await;
        assert!(matches!(outcome, Err(HandlerError::Cancelled)));
    }

    #[tokio::test]
    async fn until_cancelled_passes_through_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let outcome = until_cancelled(&cancel, async { 7 }).await;
        assert!(matches!(outcome, Ok(7)));
    }
}
