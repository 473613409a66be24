//! Store operations for `cron_jobs_metrics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{StoreClient, StoreError};

pub(crate) const TABLE: &str = "cron_jobs_metrics";

/// Aggregates produced by the weekly trend analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyMetricsRow {
    pub job_id: String,
    pub execution_id: String,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_fin: DateTime<Utc>,
    pub total_cambios: u64,
    pub promedio_cambio: f64,
    pub total_alertas: u64,
    pub alertas_criticas: u64,
    pub truncado: bool,
}

impl StoreClient {
    /// Appends one weekly-metrics row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn insert_weekly_metrics(&self, row: &WeeklyMetricsRow) -> Result<(), StoreError> {
        let request = self
            .post(&self.rest_url(TABLE))
            .header("Prefer", "return=minimal")
            .json(row);
        self.send_json(request).await?;
        Ok(())
    }
}
