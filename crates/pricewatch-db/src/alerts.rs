//! Store operations for `alertas_cambios_precios`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{StoreClient, StoreError};

pub(crate) const TABLE: &str = "alertas_cambios_precios";

/// An alert as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRow {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub producto_id: Option<String>,
    #[serde(default)]
    pub severidad: Option<String>,
    #[serde(default)]
    pub procesada: Option<bool>,
    #[serde(default)]
    pub fecha_alerta: Option<DateTime<Utc>>,
}

/// An alert about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlertRow {
    pub producto_id: Option<String>,
    pub nombre_producto: Option<String>,
    /// `aumento` or `disminucion`.
    pub tipo_cambio: String,
    pub valor_anterior: Option<f64>,
    pub valor_nuevo: Option<f64>,
    pub porcentaje_cambio: f64,
    pub severidad: String,
    pub mensaje: String,
    pub accion_recomendada: String,
    pub fecha_alerta: DateTime<Utc>,
    pub procesada: bool,
}

impl StoreClient {
    /// One page of alerts raised at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure, a non-2xx response, or a
    /// body that does not match [`AlertRow`].
    pub async fn fetch_alerts_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertRow>, StoreError> {
        self.fetch_window_page(TABLE, "fecha_alerta", since, limit, offset)
            .await
    }

    /// Inserts all `alerts` in a single request. Returns the number sent.
    ///
    /// An empty slice makes no request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure or a non-2xx response.
    pub async fn insert_alerts(&self, alerts: &[NewAlertRow]) -> Result<usize, StoreError> {
        if alerts.is_empty() {
            return Ok(0);
        }
        let request = self
            .post(&self.rest_url(TABLE))
            .header("Prefer", "return=minimal")
            .json(alerts);
        self.send_json(request).await?;
        Ok(alerts.len())
    }
}
