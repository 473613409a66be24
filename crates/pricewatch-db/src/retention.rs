//! Delete-by-age operations used by the maintenance job.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::price_changes::timestamp_param;
use crate::{alerts, execution_logs, metrics, StoreClient, StoreError};

impl StoreClient {
    /// Deletes execution-log rows that started before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn delete_execution_logs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.delete_older_than(execution_logs::TABLE, "start_time", cutoff, &[])
            .await
    }

    /// Deletes weekly-metrics rows whose window ended before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.delete_older_than(metrics::TABLE, "fecha_fin", cutoff, &[])
            .await
    }

    /// Deletes processed alerts raised before `cutoff`. Unprocessed alerts
    /// are kept regardless of age.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn delete_resolved_alerts_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.delete_older_than(
            alerts::TABLE,
            "fecha_alerta",
            cutoff,
            &[("procesada", "eq.true")],
        )
        .await
    }

    /// Issues `DELETE table?column=lt.<cutoff>` and counts the returned rows.
    async fn delete_older_than(
        &self,
        table: &str,
        column: &str,
        cutoff: DateTime<Utc>,
        extra: &[(&str, &str)],
    ) -> Result<usize, StoreError> {
        let mut params = vec![(column.to_string(), format!("lt.{}", timestamp_param(cutoff)))];
        params.extend(extra.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));

        let request = self
            .delete(&self.rest_url(table))
            .header("Prefer", "return=representation")
            .query(&params);
        let body = self.send_json(request).await?;

        Ok(match body {
            Value::Array(rows) => rows.len(),
            _ => 0,
        })
    }
}
