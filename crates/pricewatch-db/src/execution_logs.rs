//! Store operations for `cron_jobs_execution_log`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StoreClient, StoreError};

pub(crate) const TABLE: &str = "cron_jobs_execution_log";

/// One audit row per write. Rows are never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub job_id: String,
    #[serde(default)]
    pub execution_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub duracion_ms: u64,
    /// Always one of `exitoso`, `fallido`, `parcial`.
    pub estado: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub parametros: Value,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub productos_procesados: u64,
    #[serde(default)]
    pub productos_exitosos: u64,
    #[serde(default)]
    pub productos_fallidos: u64,
    #[serde(default)]
    pub alertas_generadas: u64,
    #[serde(default)]
    pub emails_enviados: u64,
    #[serde(default)]
    pub sms_enviados: u64,
    #[serde(default)]
    pub resultado: Value,
}

impl StoreClient {
    /// Appends one execution-log row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn insert_execution_log(&self, row: &ExecutionLogRow) -> Result<(), StoreError> {
        let request = self
            .post(&self.rest_url(TABLE))
            .header("Prefer", "return=minimal")
            .json(row);
        self.send_json(request).await?;
        Ok(())
    }

    /// Most recent execution-log rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure, a non-2xx response, or a
    /// body that does not match [`ExecutionLogRow`].
    pub async fn list_recent_execution_logs(
        &self,
        limit: usize,
    ) -> Result<Vec<ExecutionLogRow>, StoreError> {
        let request = self.get(&self.rest_url(TABLE)).query(&[
            ("select", "*".to_string()),
            ("order", "start_time.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        let body = self.send_json(request).await?;
        serde_json::from_value(body).map_err(|e| StoreError::Deserialize {
            context: format!("{TABLE}(limit={limit})"),
            source: e,
        })
    }

    /// Exact number of execution-log rows, optionally restricted to one
    /// `estado`. Only headers are transferred.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure, a non-2xx response, or a
    /// response without a `Content-Range` total.
    pub async fn count_execution_logs(&self, estado: Option<&str>) -> Result<u64, StoreError> {
        let mut request = self
            .head(&self.rest_url(TABLE))
            .query(&[("select", "id")]);
        if let Some(estado) = estado {
            request = request.query(&[("estado", format!("eq.{estado}"))]);
        }
        self.send_count(request).await
    }
}
