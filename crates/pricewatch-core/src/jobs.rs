use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::{create_execution_context, ExecutionSource, JobExecutionContext, Parameters};
use crate::ConfigError;

/// Scheduling category of a job, as reported to the external scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Diario,
    Semanal,
    TiempoReal,
    Manual,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::Diario => write!(f, "diario"),
            JobType::Semanal => write!(f, "semanal"),
            JobType::TiempoReal => write!(f, "tiempo_real"),
            JobType::Manual => write!(f, "manual"),
        }
    }
}

/// The handler body a job runs. Closed set: adding a variant forces every
/// dispatch site to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    DailyPriceUpdate,
    WeeklyTrendAnalysis,
    RealtimeChangeAlerts,
    MaintenanceCleanup,
}

impl JobKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::DailyPriceUpdate => "daily-price-update",
            JobKind::WeeklyTrendAnalysis => "weekly-trend-analysis",
            JobKind::RealtimeChangeAlerts => "realtime-change-alerts",
            JobKind::MaintenanceCleanup => "maintenance-cleanup",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub job_id: String,
    pub name: String,
    pub kind: JobKind,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub cron_expression: String,
    pub priority: u8,
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub notification_channels: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl JobConfig {
    /// Seconds the distributed lock is held: the job timeout rounded up,
    /// plus a minute of slack for release to happen.
    #[must_use]
    pub fn lock_seconds(&self) -> u64 {
        self.timeout_ms.div_ceil(1000) + 60
    }

    /// Circuit-breaker registry key for this job.
    #[must_use]
    pub fn circuit_key(&self) -> String {
        format!("cron-{}", self.job_id)
    }
}

#[derive(Debug, Deserialize)]
struct JobsFile {
    jobs: Vec<JobConfig>,
}

/// Immutable table of job definitions, built once at process start.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    configs: Vec<JobConfig>,
}

impl JobRegistry {
    /// Builds a registry from explicit definitions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any definition is invalid or
    /// two definitions share a `job_id`.
    pub fn new(configs: Vec<JobConfig>) -> Result<Self, ConfigError> {
        validate_jobs(&configs)?;
        Ok(Self { configs })
    }

    /// The four pipeline jobs shipped with the engine.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            configs: builtin_jobs(),
        }
    }

    /// Load and validate job definitions from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::JobsFileIo {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate job definitions from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the text cannot be parsed or fails validation.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: JobsFile = serde_yaml::from_str(content)?;
        Self::new(file.jobs)
    }

    #[must_use]
    pub fn get_job_config(&self, job_id: &str) -> Option<&JobConfig> {
        self.configs.iter().find(|c| c.job_id == job_id)
    }

    #[must_use]
    pub fn get_all_job_configs(&self) -> &[JobConfig] {
        &self.configs
    }

    #[must_use]
    pub fn get_active_jobs(&self) -> Vec<&JobConfig> {
        self.configs.iter().filter(|c| c.active).collect()
    }

    /// Builds a fresh execution context for `job_id`, or `None` when the
    /// job is not registered.
    #[must_use]
    pub fn create_execution_context(
        &self,
        job_id: &str,
        request_id: &str,
        source: ExecutionSource,
        overrides: &Parameters,
    ) -> Option<JobExecutionContext> {
        self.get_job_config(job_id)
            .map(|config| create_execution_context(config, request_id, source, overrides))
    }
}

fn validate_jobs(configs: &[JobConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for config in configs {
        if config.job_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "job_id must be non-empty".to_string(),
            ));
        }

        if config.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "job '{}' has an empty name",
                config.job_id
            )));
        }

        if !(1..=10).contains(&config.priority) {
            return Err(ConfigError::Validation(format!(
                "job '{}' has invalid priority {}; must be between 1 and 10",
                config.job_id, config.priority
            )));
        }

        if config.timeout_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "job '{}' must have a timeout greater than zero",
                config.job_id
            )));
        }

        if !seen.insert(config.job_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate job_id: '{}'",
                config.job_id
            )));
        }
    }

    Ok(())
}

fn params(entries: &[(&str, Value)]) -> Parameters {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn builtin_jobs() -> Vec<JobConfig> {
    vec![
        JobConfig {
            job_id: "daily_price_update".to_string(),
            name: "Actualizacion diaria de precios".to_string(),
            kind: JobKind::DailyPriceUpdate,
            job_type: JobType::Diario,
            cron_expression: "0 2 * * *".to_string(),
            priority: 9,
            timeout_ms: 300_000,
            max_retries: 2,
            circuit_breaker_threshold: 3,
            active: true,
            parameters: Parameters::new(),
            notification_channels: vec!["email".to_string()],
        },
        JobConfig {
            job_id: "weekly_trend_analysis".to_string(),
            name: "Analisis semanal de tendencias".to_string(),
            kind: JobKind::WeeklyTrendAnalysis,
            job_type: JobType::Semanal,
            cron_expression: "0 3 * * 0".to_string(),
            priority: 6,
            timeout_ms: 600_000,
            max_retries: 1,
            circuit_breaker_threshold: 3,
            active: true,
            parameters: params(&[("batchSize", json!(500)), ("maxRows", json!(50_000))]),
            notification_channels: vec!["email".to_string()],
        },
        JobConfig {
            job_id: "realtime_change_alerts".to_string(),
            name: "Alertas de cambios en tiempo real".to_string(),
            kind: JobKind::RealtimeChangeAlerts,
            job_type: JobType::TiempoReal,
            cron_expression: "*/15 * * * *".to_string(),
            priority: 10,
            timeout_ms: 120_000,
            max_retries: 3,
            circuit_breaker_threshold: 5,
            active: true,
            parameters: params(&[("criticalChangeThreshold", json!(15))]),
            notification_channels: vec!["email".to_string(), "sms".to_string()],
        },
        JobConfig {
            job_id: "maintenance_cleanup".to_string(),
            name: "Limpieza de mantenimiento".to_string(),
            kind: JobKind::MaintenanceCleanup,
            job_type: JobType::Manual,
            cron_expression: "0 4 * * 0".to_string(),
            priority: 3,
            timeout_ms: 900_000,
            max_retries: 1,
            circuit_breaker_threshold: 2,
            active: true,
            parameters: params(&[
                ("logsRetentionDays", json!(30)),
                ("metricsRetentionDays", json!(90)),
                ("alertsRetentionDays", json!(60)),
            ]),
            notification_channels: Vec::new(),
        },
    ]
}

#[cfg(test)]
#[path = "jobs_test.rs"]
mod tests;
