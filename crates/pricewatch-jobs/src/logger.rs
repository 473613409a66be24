//! Execution-log writer.
//!
//! Every run's audit row goes through [`ExecutionLogger::write_execution_log`],
//! which normalizes whatever the caller hands it into a well-formed
//! [`ExecutionLogRow`] and swallows write failures. Writes are not
//! idempotent: two identical calls append two rows.

use chrono::{DateTime, SecondsFormat, Utc};
use pricewatch_core::{JobExecutionContext, JobResult};
use pricewatch_db::{ExecutionLogRow, StoreClient};
use serde::Serialize;
use serde_json::Value;

/// Normalized run status as persisted in `estado`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Exitoso,
    Fallido,
    Parcial,
}

impl LogStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Exitoso => "exitoso",
            LogStatus::Fallido => "fallido",
            LogStatus::Parcial => "parcial",
        }
    }

    /// Maps a raw status through the synonym table, case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "success" | "exitoso" | "ok" => Some(LogStatus::Exitoso),
            "fallido" | "failed" | "error" => Some(LogStatus::Fallido),
            "parcial" | "partial" => Some(LogStatus::Parcial),
            _ => None,
        }
    }
}

/// Unvalidated input for one execution-log row.
///
/// Timestamps and counters are deliberately loose types so that whatever a
/// caller produced can be recorded, then corrected by normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLogEntry {
    pub job_id: String,
    pub execution_id: Option<String>,
    pub request_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub estado: String,
    pub parameters: Value,
    pub error_message: Option<String>,
    pub products_processed: f64,
    pub products_successful: f64,
    pub products_failed: f64,
    pub alerts_generated: f64,
    pub emails_sent: f64,
    pub sms_sent: f64,
    pub result: Value,
}

impl ExecutionLogEntry {
    /// Builds the entry for a finished run of `ctx`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn for_result(
        ctx: &JobExecutionContext,
        result: &JobResult,
        status: LogStatus,
        end_time: DateTime<Utc>,
    ) -> Self {
        let error_message = if result.errors.is_empty() {
            None
        } else {
            Some(result.errors.join("; "))
        };

        Self {
            job_id: ctx.job_id.clone(),
            execution_id: Some(ctx.execution_id.clone()),
            request_id: Some(ctx.request_id.clone()),
            start_time: ctx.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            end_time: end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            estado: status.as_str().to_string(),
            parameters: Value::Object(ctx.parameters.clone()),
            error_message,
            products_processed: result.products_processed as f64,
            products_successful: result.products_successful as f64,
            products_failed: result.products_failed as f64,
            alerts_generated: result.alerts_generated as f64,
            emails_sent: result.emails_sent as f64,
            sms_sent: result.sms_sent as f64,
            result: serde_json::to_value(result).unwrap_or(Value::Null),
        }
    }
}

/// Clamps a metric to a non-negative integer: NaN and negatives become 0,
/// decimals are truncated.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn clamp_metric(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    if value >= u64::MAX as f64 {
        return u64::MAX;
    }
    value.trunc() as u64
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Turns an entry into the row that gets persisted.
///
/// Any structural problem (unknown status, blank job id, unparseable
/// timestamp) forces `fallido` and is appended to `error_message` after a
/// `validation_errors=` marker.
#[must_use]
pub fn normalize_entry(entry: &ExecutionLogEntry, now: DateTime<Utc>) -> ExecutionLogRow {
    let mut validation_errors = Vec::new();

    let mut status = LogStatus::parse(&entry.estado).unwrap_or_else(|| {
        validation_errors.push(format!("estado invalido: {}", entry.estado));
        LogStatus::Fallido
    });

    let job_id = entry.job_id.trim();
    if job_id.is_empty() {
        validation_errors.push("job_id vacio".to_string());
    }

    let end_time = parse_timestamp(&entry.end_time).unwrap_or_else(|| {
        validation_errors.push(format!("end_time invalido: {}", entry.end_time));
        now
    });
    let start_time = parse_timestamp(&entry.start_time).unwrap_or_else(|| {
        validation_errors.push(format!("start_time invalido: {}", entry.start_time));
        end_time
    });

    let duracion_ms = u64::try_from((end_time - start_time).num_milliseconds()).unwrap_or(0);

    let mut error_message = entry
        .error_message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    if !validation_errors.is_empty() {
        status = LogStatus::Fallido;
        let marker = format!("validation_errors={}", validation_errors.join("; "));
        error_message = Some(match error_message {
            Some(existing) => format!("{existing} | {marker}"),
            None => marker,
        });
    }

    ExecutionLogRow {
        id: None,
        job_id: if job_id.is_empty() {
            "unknown".to_string()
        } else {
            job_id.to_string()
        },
        execution_id: entry.execution_id.clone(),
        start_time,
        end_time,
        duracion_ms,
        estado: status.as_str().to_string(),
        request_id: entry.request_id.clone(),
        parametros: entry.parameters.clone(),
        error_message,
        productos_procesados: clamp_metric(entry.products_processed),
        productos_exitosos: clamp_metric(entry.products_successful),
        productos_fallidos: clamp_metric(entry.products_failed),
        alertas_generadas: clamp_metric(entry.alerts_generated),
        emails_enviados: clamp_metric(entry.emails_sent),
        sms_enviados: clamp_metric(entry.sms_sent),
        resultado: entry.result.clone(),
    }
}

/// Persists execution logs. Never fails from the caller's point of view.
#[derive(Debug, Clone)]
pub struct ExecutionLogger {
    store: StoreClient,
}

impl ExecutionLogger {
    #[must_use]
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Normalizes and appends one row. Write failures are logged as
    /// warnings and otherwise ignored.
    pub async fn write_execution_log(&self, entry: ExecutionLogEntry) {
        let row = normalize_entry(&entry, Utc::now());

        if row.estado != entry.estado {
            tracing::debug!(
                job_id = %row.job_id,
                raw = %entry.estado,
                estado = %row.estado,
                "execution log status normalized"
            );
        }

        if let Err(e) = self.store.insert_execution_log(&row).await {
            tracing::warn!(
                job_id = %row.job_id,
                execution_id = row.execution_id.as_deref().unwrap_or("-"),
                error = %e,
                "failed to write execution log"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry(estado: &str) -> ExecutionLogEntry {
        ExecutionLogEntry {
            job_id: "daily_price_update".to_string(),
            execution_id: Some("exec-1".to_string()),
            request_id: Some("req-1".to_string()),
            start_time: "2026-01-05T02:00:00.000Z".to_string(),
            end_time: "2026-01-05T02:00:01.500Z".to_string(),
            estado: estado.to_string(),
            parameters: json!({}),
            error_message: None,
            products_processed: 10.0,
            products_successful: 9.0,
            products_failed: 1.0,
            alerts_generated: 0.0,
            emails_sent: 0.0,
            sms_sent: 0.0,
            result: json!({}),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 3, 0, 0).unwrap()
    }

    #[test]
    fn success_synonyms_normalize_to_exitoso() {
        for raw in ["success", "exitoso", "ok", "SUCCESS", " Ok "] {
            let row = normalize_entry(&entry(raw), now());
            assert_eq!(row.estado, "exitoso", "raw status {raw:?}");
            assert!(row.error_message.is_none());
        }
    }

    #[test]
    fn failure_and_partial_synonyms() {
        for raw in ["fallido", "failed", "error", "Error"] {
            assert_eq!(normalize_entry(&entry(raw), now()).estado, "fallido");
        }
        for raw in ["parcial", "partial", "PARTIAL"] {
            assert_eq!(normalize_entry(&entry(raw), now()).estado, "parcial");
        }
    }

    #[test]
    fn unknown_status_becomes_fallido_with_validation_errors() {
        let row = normalize_entry(&entry("weird"), now());
        assert_eq!(row.estado, "fallido");
        let message = row.error_message.expect("error message");
        assert!(message.contains("validation_errors=estado invalido: weird"));
    }

    #[test]
    fn validation_errors_are_appended_to_existing_message() {
        let mut e = entry("bogus");
        e.error_message = Some("scraper exploded".to_string());
        let message = normalize_entry(&e, now()).error_message.expect("message");
        assert!(message.starts_with("scraper exploded | validation_errors="));
    }

    #[test]
    fn metrics_are_clamped_and_truncated() {
        assert_eq!(clamp_metric(-10.0), 0);
        assert_eq!(clamp_metric(f64::NAN), 0);
        assert_eq!(clamp_metric(10.9), 10);
        assert_eq!(clamp_metric(0.0), 0);
        assert_eq!(clamp_metric(f64::INFINITY), u64::MAX);

        let mut e = entry("ok");
        e.products_processed = -10.0;
        e.products_successful = f64::NAN;
        e.alerts_generated = 10.9;
        let row = normalize_entry(&e, now());
        assert_eq!(row.productos_procesados, 0);
        assert_eq!(row.productos_exitosos, 0);
        assert_eq!(row.alertas_generadas, 10);
    }

    #[test]
    fn duration_is_end_minus_start() {
        assert_eq!(normalize_entry(&entry("ok"), now()).duracion_ms, 1_500);
    }

    #[test]
    fn end_before_start_clamps_duration_to_zero() {
        let mut e = entry("ok");
        e.end_time = "2026-01-05T01:00:00Z".to_string();
        let row = normalize_entry(&e, now());
        assert_eq!(row.duracion_ms, 0);
        assert_eq!(row.estado, "exitoso");
    }

    #[test]
    fn blank_job_id_forces_fallido() {
        let mut e = entry("ok");
        e.job_id = "   ".to_string();
        let row = normalize_entry(&e, now());
        assert_eq!(row.estado, "fallido");
        assert_eq!(row.job_id, "unknown");
        assert!(row
            .error_message
            .expect("message")
            .contains("job_id vacio"));
    }

    #[test]
    fn unparseable_timestamps_force_fallido() {
        let mut e = entry("ok");
        e.start_time = "yesterday".to_string();
        e.end_time = "not a date".to_string();
        let row = normalize_entry(&e, now());
        assert_eq!(row.estado, "fallido");
        assert_eq!(row.end_time, now());
        assert_eq!(row.start_time, now());
        let message = row.error_message.expect("message");
        assert!(message.contains("start_time invalido: yesterday"));
        assert!(message.contains("end_time invalido: not a date"));
    }

    #[tokio::test]
    async fn identical_entries_are_written_as_separate_rows() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/cron_jobs_execution_log"))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&server)
            .await;

        let store = StoreClient::new(&server.uri(), "service-key", 5).expect("client");
        let logger = ExecutionLogger::new(store);
        logger.write_execution_log(entry("exitoso")).await;
        logger.write_execution_log(entry("exitoso")).await;

        let bodies: Vec<Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).expect("row json"))
            .collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], bodies[1]);
    }

    #[tokio::test]
    async fn rejected_write_is_swallowed() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let store = StoreClient::new(&server.uri(), "service-key", 5).expect("client");
        ExecutionLogger::new(store)
            .write_execution_log(entry("fallido"))
            .await;
    }
}
