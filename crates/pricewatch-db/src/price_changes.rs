//! Store reads over `precios_historicos`, the price-delta history.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{StoreClient, StoreError};

pub(crate) const TABLE: &str = "precios_historicos";

/// One recorded price change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChangeRow {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub producto_id: Option<String>,
    #[serde(default)]
    pub nombre_producto: Option<String>,
    #[serde(default)]
    pub precio_anterior: Option<f64>,
    #[serde(default)]
    pub precio_nuevo: Option<f64>,
    /// Signed percentage, e.g. `-20.0` for a 20 % drop.
    #[serde(default)]
    pub cambio_porcentaje: Option<f64>,
    #[serde(default)]
    pub fecha_cambio: Option<DateTime<Utc>>,
}

impl StoreClient {
    /// One page of price changes recorded at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on network failure, a non-2xx response, or a
    /// body that does not match [`PriceChangeRow`].
    pub async fn fetch_price_changes_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PriceChangeRow>, StoreError> {
        self.fetch_window_page(TABLE, "fecha_cambio", since, limit, offset)
            .await
    }

    /// Fetches one `limit`/`offset` page of `table` filtered to rows whose
    /// `column` is at or after `since`.
    pub(crate) async fn fetch_window_page<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<T>, StoreError> {
        let request = self.get(&self.rest_url(table)).query(&[
            ("select", "*".to_string()),
            (column, format!("gte.{}", timestamp_param(since))),
            ("order", format!("{column}.asc")),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]);
        let body = self.send_json(request).await?;
        serde_json::from_value(body).map_err(|e| StoreError::Deserialize {
            context: format!("{table}(offset={offset})"),
            source: e,
        })
    }
}

/// RFC 3339 with a `Z` suffix, so no `+` needs escaping in query strings.
pub(crate) fn timestamp_param(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_param_uses_zulu_suffix() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(timestamp_param(ts), "2026-03-01T12:30:00.000Z");
    }

    #[test]
    fn price_change_tolerates_missing_columns() {
        let row: PriceChangeRow =
            serde_json::from_value(serde_json::json!({"cambio_porcentaje": 12.5})).expect("row");
        assert_eq!(row.cambio_porcentaje, Some(12.5));
        assert!(row.producto_id.is_none());
    }
}
