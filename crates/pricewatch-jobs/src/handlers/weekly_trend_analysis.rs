//! Seven-day rollup of price changes and alerts into `cron_jobs_metrics`.

use chrono::Duration;
use pricewatch_core::{JobExecutionContext, JobResult};
use pricewatch_db::{AlertRow, PriceChangeRow, WeeklyMetricsRow};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{fetch_paged, HandlerError, JobDeps, Outcome};
use crate::validation::read_bounded_u64;

const DEFAULT_BATCH_SIZE: u64 = 500;
const MAX_BATCH_SIZE: u64 = 5_000;
const DEFAULT_MAX_ROWS: u64 = 50_000;
const MAX_MAX_ROWS: u64 = 500_000;
const WINDOW_DAYS: i64 = 7;

const CRITICAL_ALERTS_THRESHOLD: u64 = 10;
const CHANGES_THRESHOLD: u64 = 100;

#[derive(Debug, Default, PartialEq)]
struct WeeklySummary {
    total_changes: u64,
    avg_abs_change: f64,
    total_alerts: u64,
    critical_alerts: u64,
}

pub(super) async fn run(
    ctx: &JobExecutionContext,
    deps: &JobDeps,
    cancel: &CancellationToken,
) -> Result<Outcome, HandlerError> {
    let (batch_size, max_rows) = match read_limits(ctx) {
        Ok(limits) => limits,
        Err(reason) => return Ok(Outcome::Rejected(reason)),
    };

    let window_end = ctx.start_time;
    let window_start = window_end - Duration::days(WINDOW_DAYS);
    let store = &deps.store;

    let changes = fetch_paged(
        batch_size,
        max_rows,
        cancel,
        "Failed to fetch price changes",
        move |limit, offset| store.fetch_price_changes_since(window_start, limit, offset),
    )
    .await?;
    let alerts = fetch_paged(
        batch_size,
        max_rows,
        cancel,
        "Failed to fetch alerts",
        move |limit, offset| store.fetch_alerts_since(window_start, limit, offset),
    )
    .await?;

    if cancel.is_cancelled() {
        return Err(HandlerError::Cancelled);
    }

    let summary = summarize(&changes.rows, &alerts.rows);
    let truncated = changes.truncated || alerts.truncated;

    store
        .insert_weekly_metrics(&WeeklyMetricsRow {
            job_id: ctx.job_id.clone(),
            execution_id: ctx.execution_id.clone(),
            fecha_inicio: window_start,
            fecha_fin: window_end,
            total_cambios: summary.total_changes,
            promedio_cambio: summary.avg_abs_change,
            total_alertas: summary.total_alerts,
            alertas_criticas: summary.critical_alerts,
            truncado: truncated,
        })
        .await
        .map_err(HandlerError::store("Failed to store weekly metrics"))?;

    let mut result = JobResult {
        success: true,
        products_processed: summary.total_changes,
        products_successful: summary.total_changes,
        ..JobResult::default()
    };
    result.metrics.insert("total_changes".to_string(), json!(summary.total_changes));
    result.metrics.insert("avg_abs_change".to_string(), json!(summary.avg_abs_change));
    result.metrics.insert("total_alerts".to_string(), json!(summary.total_alerts));
    result.metrics.insert("critical_alerts".to_string(), json!(summary.critical_alerts));
    result.metrics.insert("truncated".to_string(), json!(truncated));

    if truncated {
        result.warnings.push(format!(
            "Row limit of {max_rows} reached; weekly figures cover a partial window"
        ));
    }
    result.recommendations = recommendations(&summary);

    Ok(Outcome::Done(result))
}

fn read_limits(ctx: &JobExecutionContext) -> Result<(usize, usize), String> {
    let batch = read_bounded_u64(&ctx.parameters, "batchSize", DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE)?;
    let max_rows = read_bounded_u64(&ctx.parameters, "maxRows", DEFAULT_MAX_ROWS, MAX_MAX_ROWS)?;
    let to_usize = |v: u64| usize::try_from(v).map_err(|_| format!("limit {v} out of range"));
    Ok((to_usize(batch)?, to_usize(max_rows)?))
}

#[allow(clippy::cast_precision_loss)]
fn summarize(changes: &[PriceChangeRow], alerts: &[AlertRow]) -> WeeklySummary {
    let percentages: Vec<f64> = changes
        .iter()
        .filter_map(|row| row.cambio_porcentaje)
        .filter(|p| p.is_finite())
        .collect();
    let avg_abs_change = if percentages.is_empty() {
        0.0
    } else {
        let mean = percentages.iter().map(|p| p.abs()).sum::<f64>() / percentages.len() as f64;
        (mean * 100.0).round() / 100.0
    };

    let critical_alerts = alerts
        .iter()
        .filter(|a| {
            a.severidad
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("critica"))
        })
        .count();

    WeeklySummary {
        total_changes: changes.len() as u64,
        avg_abs_change,
        total_alerts: alerts.len() as u64,
        critical_alerts: critical_alerts as u64,
    }
}

fn recommendations(summary: &WeeklySummary) -> Vec<String> {
    let mut out = Vec::new();
    if summary.critical_alerts > CRITICAL_ALERTS_THRESHOLD {
        out.push(format!(
            "{} critical alerts this week; review pricing for the affected products",
            summary.critical_alerts
        ));
    }
    if summary.total_changes > CHANGES_THRESHOLD {
        out.push(format!(
            "High price volatility ({} changes); consider monitoring more often",
            summary.total_changes
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(pct: Option<f64>) -> PriceChangeRow {
        PriceChangeRow {
            id: None,
            producto_id: None,
            nombre_producto: None,
            precio_anterior: None,
            precio_nuevo: None,
            cambio_porcentaje: pct,
            fecha_cambio: None,
        }
    }

    fn alert(severidad: &str) -> AlertRow {
        AlertRow {
            id: None,
            producto_id: None,
            severidad: Some(severidad.to_string()),
            procesada: None,
            fecha_alerta: None,
        }
    }

    #[test]
    fn summary_uses_absolute_mean_and_counts_critical() {
        let changes = vec![change(Some(10.0)), change(Some(-20.0)), change(None)];
        let alerts = vec![alert("critica"), alert("CRITICA"), alert("media")];
        let summary = summarize(&changes, &alerts);
        assert_eq!(summary.total_changes, 3);
        assert!((summary.avg_abs_change - 15.0).abs() < f64::EPSILON);
        assert_eq!(summary.total_alerts, 3);
        assert_eq!(summary.critical_alerts, 2);
    }

    #[test]
    fn empty_window_summarizes_to_zero() {
        assert_eq!(summarize(&[], &[]), WeeklySummary::default());
    }

    #[test]
    fn recommendations_fire_above_thresholds_only() {
        let quiet = WeeklySummary {
            total_changes: 100,
            critical_alerts: 10,
            ..WeeklySummary::default()
        };
        assert!(recommendations(&quiet).is_empty());

        let busy = WeeklySummary {
            total_changes: 101,
            critical_alerts: 11,
            ..WeeklySummary::default()
        };
        assert_eq!(recommendations(&busy).len(), 2);
    }
}
