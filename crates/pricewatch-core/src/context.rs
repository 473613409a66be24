//! Per-run identity for a job execution.

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::JobConfig;

/// String-keyed job parameters.
pub type Parameters = serde_json::Map<String, Value>;

/// What triggered a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSource {
    Scheduled,
    Manual,
    Api,
    Recovery,
}

impl std::fmt::Display for ExecutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionSource::Scheduled => write!(f, "scheduled"),
            ExecutionSource::Manual => write!(f, "manual"),
            ExecutionSource::Api => write!(f, "api"),
            ExecutionSource::Recovery => write!(f, "recovery"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionContext {
    /// Unique per run. Doubles as the distributed-lock owner token.
    pub execution_id: String,
    pub job_id: String,
    /// `run_<epochMs>_<rand6>`, for humans reading logs.
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub request_id: String,
    pub source: ExecutionSource,
    pub parameters: Parameters,
}

/// Builds the context for one run of `config`.
///
/// `overrides` replace `config.parameters` key by key; nested objects are
/// replaced whole, not merged.
#[must_use]
pub fn create_execution_context(
    config: &JobConfig,
    request_id: &str,
    source: ExecutionSource,
    overrides: &Parameters,
) -> JobExecutionContext {
    let mut parameters = config.parameters.clone();
    for (key, value) in overrides {
        parameters.insert(key.clone(), value.clone());
    }

    JobExecutionContext {
        execution_id: Uuid::new_v4().to_string(),
        job_id: config.job_id.clone(),
        run_id: new_run_id(),
        start_time: Utc::now(),
        request_id: request_id.to_string(),
        source,
        parameters,
    }
}

/// Generates a `run_<epochMs>_<rand6>` correlation id.
#[must_use]
pub fn new_run_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("run_{}_{suffix}", Utc::now().timestamp_millis())
}
