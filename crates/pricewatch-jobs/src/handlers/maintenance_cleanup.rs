//! Retention cleanup over execution logs, weekly metrics and resolved alerts.

use chrono::Duration;
use pricewatch_core::{JobExecutionContext, JobResult};
use pricewatch_db::StoreError;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{HandlerError, JobDeps, Outcome};
use crate::validation::read_bounded_u64;

const DEFAULT_LOGS_DAYS: u64 = 30;
const DEFAULT_METRICS_DAYS: u64 = 90;
const DEFAULT_ALERTS_DAYS: u64 = 60;
const MAX_RETENTION_DAYS: u64 = 3_650;
const HIGH_VOLUME_DELETES: usize = 1_000;

struct Retention {
    logs_days: u64,
    metrics_days: u64,
    alerts_days: u64,
}

impl Retention {
    fn from_context(ctx: &JobExecutionContext) -> Result<Self, String> {
        let p = &ctx.parameters;
        Ok(Self {
            logs_days: read_bounded_u64(p, "logsRetentionDays", DEFAULT_LOGS_DAYS, MAX_RETENTION_DAYS)?,
            metrics_days: read_bounded_u64(
                p,
                "metricsRetentionDays",
                DEFAULT_METRICS_DAYS,
                MAX_RETENTION_DAYS,
            )?,
            alerts_days: read_bounded_u64(
                p,
                "alertsRetentionDays",
                DEFAULT_ALERTS_DAYS,
                MAX_RETENTION_DAYS,
            )?,
        })
    }
}

/// Each delete runs regardless of how the others went.
pub(super) async fn run(
    ctx: &JobExecutionContext,
    deps: &JobDeps,
    cancel: &CancellationToken,
) -> Result<Outcome, HandlerError> {
    let retention = match Retention::from_context(ctx) {
        Ok(r) => r,
        Err(reason) => return Ok(Outcome::Rejected(reason)),
    };
    let cutoff = |days: u64| ctx.start_time - Duration::days(i64::try_from(days).unwrap_or(0));
    let store = &deps.store;
    let mut errors = Vec::new();

    let logs = store.delete_execution_logs_before(cutoff(retention.logs_days)).await;
    let logs_deleted = tally(logs, "execution logs", &mut errors, ctx);

    if cancel.is_cancelled() {
        return Err(HandlerError::Cancelled);
    }
    let metrics = store.delete_metrics_before(cutoff(retention.metrics_days)).await;
    let metrics_deleted = tally(metrics, "metrics", &mut errors, ctx);

    if cancel.is_cancelled() {
        return Err(HandlerError::Cancelled);
    }
    let alerts = store
        .delete_resolved_alerts_before(cutoff(retention.alerts_days))
        .await;
    let alerts_deleted = tally(alerts, "resolved alerts", &mut errors, ctx);

    let total = logs_deleted + metrics_deleted + alerts_deleted;
    let mut result = JobResult {
        success: errors.len() < 3,
        products_processed: total as u64,
        products_successful: total as u64,
        errors,
        ..JobResult::default()
    };
    result.metrics.insert("logs_deleted".to_string(), json!(logs_deleted));
    result.metrics.insert("metrics_deleted".to_string(), json!(metrics_deleted));
    result.metrics.insert("alerts_deleted".to_string(), json!(alerts_deleted));
    result.metrics.insert("total_deleted".to_string(), json!(total));

    if total > HIGH_VOLUME_DELETES {
        result.recommendations.push(format!(
            "{total} rows deleted in one pass; consider shorter retention periods or running cleanup more often"
        ));
    }

    Ok(Outcome::Done(result))
}

fn tally(
    outcome: Result<usize, StoreError>,
    what: &str,
    errors: &mut Vec<String>,
    ctx: &JobExecutionContext,
) -> usize {
    match outcome {
        Ok(n) => {
            tracing::debug!(job_id = %ctx.job_id, run_id = %ctx.run_id, what, deleted = n, "retention delete");
            n
        }
        Err(e) => {
            tracing::warn!(job_id = %ctx.job_id, run_id = %ctx.run_id, what, error = %e, "retention delete failed");
            errors.push(format!("Failed to delete {what}: {e}"));
            0
        }
    }
}
