//! Triggers the supplier scraper, then the price comparison.

use pricewatch_core::{JobExecutionContext, JobResult};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{until_cancelled, HandlerError, JobDeps, Outcome};

pub(super) async fn run(
    ctx: &JobExecutionContext,
    deps: &JobDeps,
    cancel: &CancellationToken,
) -> Result<Outcome, HandlerError> {
    let body = trigger_body(ctx);

    let scrape = until_cancelled(cancel, deps.store.trigger_scraper(&body))
        .await?
        .map_err(HandlerError::store("Scraper failed"))?;

    tracing::info!(
        job_id = %ctx.job_id,
        run_id = %ctx.run_id,
        extracted = scrape.productos_extraidos,
        saved = scrape.guardados,
        "scraper finished"
    );

    let mut result = JobResult {
        success: true,
        products_processed: scrape.productos_extraidos,
        products_successful: scrape.guardados,
        products_failed: scrape.productos_extraidos.saturating_sub(scrape.guardados),
        ..JobResult::default()
    };

    match until_cancelled(cancel, deps.store.trigger_comparison(&body)).await? {
        Ok(comparison) => {
            result.alerts_generated = comparison.oportunidades;
            result
                .metrics
                .insert("oportunidades".to_string(), json!(comparison.oportunidades));
        }
        Err(e) => {
            tracing::warn!(job_id = %ctx.job_id, run_id = %ctx.run_id, error = %e, "price comparison failed");
            result.errors.push(format!("Comparison failed: {e}"));
        }
    }

    result.metrics.insert(
        "productos_extraidos".to_string(),
        json!(scrape.productos_extraidos),
    );
    result
        .metrics
        .insert("guardados".to_string(), json!(scrape.guardados));
    result.recommendations = recommendations(&result);

    Ok(Outcome::Done(result))
}

fn trigger_body(ctx: &JobExecutionContext) -> Value {
    json!({
        "trigger": "cron",
        "jobId": ctx.job_id,
        "executionId": ctx.execution_id,
        "runId": ctx.run_id,
        "parameters": ctx.parameters,
    })
}

fn recommendations(result: &JobResult) -> Vec<String> {
    let mut out = Vec::new();
    if result.products_processed == 0 {
        out.push("Scraper returned no products; check the supplier site and scraper health".to_string());
    }
    if result.products_failed > 0 {
        out.push(format!(
            "{} products failed to save; review scraper logs",
            result.products_failed
        ));
    }
    if result.alerts_generated > 0 {
        out.push(format!(
            "Review {} pricing opportunities found by the comparison",
            result.alerts_generated
        ));
    }
    if out.is_empty() {
        out.push("Prices are up to date; no action needed".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_to_date_when_nothing_notable() {
        let result = JobResult {
            success: true,
            products_processed: 10,
            products_successful: 10,
            ..JobResult::default()
        };
        assert_eq!(
            recommendations(&result),
            vec!["Prices are up to date; no action needed".to_string()]
        );
    }

    #[test]
    fn failures_and_opportunities_are_called_out() {
        let result = JobResult {
            success: true,
            products_processed: 50,
            products_successful: 45,
            products_failed: 5,
            alerts_generated: 3,
            ..JobResult::default()
        };
        let recs = recommendations(&result);
        assert_eq!(recs.len(), 2);
        assert!(recs[0].starts_with("5 products failed"));
        assert!(recs[1].contains("3 pricing opportunities"));
    }

    #[test]
    fn empty_scrape_is_flagged() {
        let recs = recommendations(&JobResult::default());
        assert!(recs[0].contains("no products"));
    }
}
