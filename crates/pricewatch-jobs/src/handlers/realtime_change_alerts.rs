//! Turns large price moves from the last few minutes into critical alerts.

use chrono::{Duration, Utc};
use pricewatch_core::{JobExecutionContext, JobResult};
use pricewatch_db::{NewAlertRow, PriceChangeRow};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{fetch_paged, HandlerError, JobDeps, Outcome};
use crate::validation::read_non_negative_f64;

const DEFAULT_THRESHOLD_PCT: f64 = 15.0;
const WINDOW_MINUTES: i64 = 15;
const BATCH_SIZE: usize = 500;
const MAX_ROWS: usize = 5_000;

pub(super) async fn run(
    ctx: &JobExecutionContext,
    deps: &JobDeps,
    cancel: &CancellationToken,
) -> Result<Outcome, HandlerError> {
    let threshold = match read_non_negative_f64(
        &ctx.parameters,
        "criticalChangeThreshold",
        DEFAULT_THRESHOLD_PCT,
    ) {
        Ok(t) => t,
        Err(reason) => return Ok(Outcome::Rejected(reason)),
    };

    let since = ctx.start_time - Duration::minutes(WINDOW_MINUTES);
    let store = &deps.store;
    let changes = fetch_paged(
        BATCH_SIZE,
        MAX_ROWS,
        cancel,
        "Failed to fetch price changes",
        move |limit, offset| store.fetch_price_changes_since(since, limit, offset),
    )
    .await?;

    let alerts: Vec<NewAlertRow> = changes
        .rows
        .iter()
        .filter_map(|row| build_alert(row, threshold))
        .collect();

    if cancel.is_cancelled() {
        return Err(HandlerError::Cancelled);
    }

    let inserted = store
        .insert_alerts(&alerts)
        .await
        .map_err(HandlerError::store("Failed to insert alerts"))?;

    tracing::info!(
        job_id = %ctx.job_id,
        run_id = %ctx.run_id,
        checked = changes.rows.len(),
        alerts = inserted,
        threshold,
        "realtime price check finished"
    );

    let checked = changes.rows.len() as u64;
    let mut result = JobResult {
        success: true,
        products_processed: checked,
        products_successful: checked,
        alerts_generated: inserted as u64,
        ..JobResult::default()
    };
    result.metrics.insert("changes_checked".to_string(), json!(checked));
    result.metrics.insert("threshold_pct".to_string(), json!(threshold));
    result.metrics.insert("alerts_created".to_string(), json!(inserted));
    if changes.truncated {
        result
            .warnings
            .push(format!("More than {MAX_ROWS} price changes in window; extra rows skipped"));
    }
    if inserted > 0 {
        result.recommendations.push(format!(
            "Review {inserted} critical price changes from the last {WINDOW_MINUTES} minutes"
        ));
    }

    Ok(Outcome::Done(result))
}

/// Percentage change of a row, derived from the prices when the store left
/// it empty.
fn change_pct(row: &PriceChangeRow) -> Option<f64> {
    let pct = row.cambio_porcentaje.or_else(|| {
        let (before, after) = (row.precio_anterior?, row.precio_nuevo?);
        (before != 0.0).then(|| (after - before) / before * 100.0)
    })?;
    pct.is_finite().then_some(pct)
}

fn build_alert(row: &PriceChangeRow, threshold: f64) -> Option<NewAlertRow> {
    let pct = change_pct(row)?;
    if pct.abs() < threshold {
        return None;
    }

    let rising = pct > 0.0;
    let name = row
        .nombre_producto
        .as_deref()
        .or(row.producto_id.as_deref())
        .unwrap_or("producto desconocido");

    Some(NewAlertRow {
        producto_id: row.producto_id.clone(),
        nombre_producto: row.nombre_producto.clone(),
        tipo_cambio: if rising { "aumento" } else { "disminucion" }.to_string(),
        valor_anterior: row.precio_anterior,
        valor_nuevo: row.precio_nuevo,
        porcentaje_cambio: pct,
        severidad: "critica".to_string(),
        mensaje: format!("{name}: price changed {pct:+.2}%"),
        accion_recomendada: if rising {
            "Review supplier cost and update the retail price"
        } else {
            "Evaluate a purchase at the lower price"
        }
        .to_string(),
        fecha_alerta: Utc::now(),
        procesada: false,
    })
}
