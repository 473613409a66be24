//! Triggers for the scraper and price-comparison edge functions.
//!
//! Both services are opaque: this module only knows the endpoint paths and
//! the handful of counters the cron engine reads back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StoreClient, StoreError};

const SCRAPE_PATH: &str = "scraper-maxiconsumo/scrape";
const COMPARE_PATH: &str = "scraper-maxiconsumo/compare";

/// Counters reported by a scraper run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSummary {
    pub productos_extraidos: u64,
    pub guardados: u64,
}

/// Counters reported by a comparison run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub oportunidades: u64,
}

impl StoreClient {
    /// Starts a scraper run and returns its counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn trigger_scraper(&self, body: &Value) -> Result<ScrapeSummary, StoreError> {
        let request = self.post(&self.function_url(SCRAPE_PATH)).json(body);
        let response = self.send_json(request).await?;
        Ok(ScrapeSummary {
            productos_extraidos: count_field(&response, "productos_extraidos"),
            guardados: count_field(&response, "guardados"),
        })
    }

    /// Starts a price comparison run and returns its counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn trigger_comparison(&self, body: &Value) -> Result<ComparisonSummary, StoreError> {
        let request = self.post(&self.function_url(COMPARE_PATH)).json(body);
        let response = self.send_json(request).await?;
        Ok(ComparisonSummary {
            oportunidades: count_field(&response, "oportunidades"),
        })
    }
}

/// Reads a non-negative integer counter from `body` or `body.data`.
///
/// Missing, negative, or non-numeric values read as zero; decimals are
/// truncated.
fn count_field(body: &Value, key: &str) -> u64 {
    let raw = body
        .get(key)
        .or_else(|| body.get("data").and_then(|d| d.get(key)));

    match raw {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map_or(0, truncate_to_u64)
        }),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f > 0.0)
            .map_or(0, truncate_to_u64),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn truncate_to_u64(value: f64) -> u64 {
    value.trunc() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn count_field_reads_top_level_and_nested() {
        assert_eq!(count_field(&json!({"guardados": 45}), "guardados"), 45);
        assert_eq!(
            count_field(&json!({"data": {"guardados": 12}}), "guardados"),
            12
        );
    }

    #[test]
    fn count_field_clamps_and_truncates() {
        assert_eq!(count_field(&json!({"n": -3}), "n"), 0);
        assert_eq!(count_field(&json!({"n": 7.9}), "n"), 7);
        assert_eq!(count_field(&json!({"n": "11"}), "n"), 11);
        assert_eq!(count_field(&json!({"n": "abc"}), "n"), 0);
        assert_eq!(count_field(&json!({}), "n"), 0);
    }
}
