use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use pricewatch_core::{
    new_run_id, ExecutionSource, JobConfig, JobKind, JobResult, JobType, Parameters,
};
use pricewatch_db::ExecutionLogRow;
use pricewatch_jobs::{CircuitState, EngineError, LogStatus};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_store_error, normalize_limit, ApiError, AppState};

const DEFAULT_STATUS_LIMIT: usize = 20;
const DEFAULT_METRICS_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExecuteRequest {
    job_id: Option<String>,
    #[serde(default)]
    parameters: Parameters,
}

#[derive(Debug, Deserialize)]
pub(super) struct ExecuteQuery {
    #[serde(rename = "jobId")]
    job_id: Option<String>,
}

/// Flat body of the execute endpoint. Always carries `jobId` and `runId`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExecuteResponse {
    success: bool,
    job_id: Option<String>,
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    request_id: String,
}

impl ExecuteResponse {
    fn rejected(job_id: Option<String>, request_id: String, error: String) -> Self {
        Self {
            success: false,
            job_id,
            run_id: new_run_id(),
            execution_id: None,
            result: None,
            error: Some(error),
            request_id,
        }
    }
}

pub(super) async fn execute(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ExecuteQuery>,
    body: Bytes,
) -> (StatusCode, Json<ExecuteResponse>) {
    let request = match parse_execute_body(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ExecuteResponse::rejected(
                    query.job_id,
                    req_id.0,
                    format!("invalid request body: {e}"),
                )),
            );
        }
    };

    let Some(job_id) = request
        .job_id
        .or(query.job_id)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ExecuteResponse::rejected(
                None,
                req_id.0,
                "jobId is required".to_string(),
            )),
        );
    };

    let outcome = state
        .orchestrator
        .execute_job(&job_id, &req_id.0, ExecutionSource::Api, &request.parameters)
        .await;

    match outcome {
        Ok(run) => (
            StatusCode::OK,
            Json(ExecuteResponse {
                success: true,
                job_id: Some(run.job_id),
                run_id: run.run_id,
                execution_id: Some(run.execution_id),
                result: Some(run.result),
                error: None,
                request_id: req_id.0,
            }),
        ),
        Err(err) => {
            let status = match err {
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(job_id = %job_id, error = %err, "execute request failed");
            (
                status,
                Json(ExecuteResponse {
                    success: false,
                    job_id: Some(job_id),
                    run_id: err.run_id().map_or_else(new_run_id, str::to_string),
                    execution_id: err.execution_id().map(str::to_string),
                    result: err.result().cloned(),
                    error: Some(err.to_string()),
                    request_id: req_id.0,
                }),
            )
        }
    }
}

fn parse_execute_body(body: &[u8]) -> Result<ExecuteRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExecuteRequest::default());
    }
    serde_json::from_slice(body)
}

#[derive(Debug, Deserialize)]
pub(super) struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct JobStatusItem {
    job_id: String,
    name: String,
    kind: JobKind,
    job_type: JobType,
    cron_expression: String,
    priority: u8,
    active: bool,
    circuit_state: CircuitState,
}

#[derive(Debug, Serialize)]
pub(super) struct StatusData {
    jobs: Vec<JobStatusItem>,
    recent_executions: Vec<ExecutionLogRow>,
}

pub(super) async fn status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<StatusData>, ApiError> {
    let recent_executions = state
        .store
        .list_recent_execution_logs(normalize_limit(query.limit, DEFAULT_STATUS_LIMIT))
        .await
        .map_err(|e| map_store_error(req_id.0, &e))?;

    let circuits: HashMap<String, CircuitState> =
        state.orchestrator.breakers().snapshot().into_iter().collect();

    let jobs = state
        .orchestrator
        .registry()
        .get_all_job_configs()
        .iter()
        .map(|config| JobStatusItem {
            job_id: config.job_id.clone(),
            name: config.name.clone(),
            kind: config.kind,
            job_type: config.job_type,
            cron_expression: config.cron_expression.clone(),
            priority: config.priority,
            active: config.active,
            circuit_state: circuits
                .get(&config.circuit_key())
                .copied()
                .unwrap_or(CircuitState::Closed),
        })
        .collect();

    Ok(Json(StatusData {
        jobs,
        recent_executions,
    }))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub(super) struct MetricsData {
    total_executions: u64,
    successful: u64,
    failed: u64,
    partial: u64,
    /// Mean `duracion_ms` over the latest `limit` rows.
    avg_execution_time: u64,
}

pub(super) async fn metrics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<MetricsData>, ApiError> {
    let store = &state.store;
    let (total_executions, successful, failed, partial, recent) = tokio::try_join!(
        store.count_execution_logs(None),
        store.count_execution_logs(Some(LogStatus::Exitoso.as_str())),
        store.count_execution_logs(Some(LogStatus::Fallido.as_str())),
        store.count_execution_logs(Some(LogStatus::Parcial.as_str())),
        store.list_recent_execution_logs(normalize_limit(query.limit, DEFAULT_METRICS_LIMIT)),
    )
    .map_err(|e| map_store_error(req_id.0, &e))?;

    Ok(Json(MetricsData {
        total_executions,
        successful,
        failed,
        partial,
        avg_execution_time: average_duration_ms(&recent),
    }))
}

fn average_duration_ms(rows: &[ExecutionLogRow]) -> u64 {
    let total_ms = rows
        .iter()
        .fold(0_u64, |acc, row| acc.saturating_add(row.duracion_ms));
    match u64::try_from(rows.len()) {
        Ok(count) if count > 0 => total_ms / count,
        _ => 0,
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(super) struct HealthData {
    status: &'static str,
    db: &'static str,
}

pub(super) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthData {
                status: "ok",
                db: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthData {
                    status: "degraded",
                    db: "unavailable",
                }),
            )
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct JobsData {
    jobs: Vec<JobConfig>,
}

pub(super) async fn list_jobs(State(state): State<AppState>) -> Json<JobsData> {
    Json(JobsData {
        jobs: state.orchestrator.registry().get_all_job_configs().to_vec(),
    })
}
