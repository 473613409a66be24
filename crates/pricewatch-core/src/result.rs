use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Outcome of one job run, produced exactly once by the handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub execution_time_ms: u64,
    pub products_processed: u64,
    pub products_successful: u64,
    pub products_failed: u64,
    pub alerts_generated: u64,
    pub emails_sent: u64,
    pub sms_sent: u64,
    pub metrics: serde_json::Map<String, Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl JobResult {
    /// A failed result carrying a single error message.
    #[must_use]
    pub fn failure(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            execution_time_ms,
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    /// Input rejected before any side effect.
    #[must_use]
    pub fn validation_failure(reason: &str) -> Self {
        Self::failure(format!("Validation: {reason}"), 0)
    }

    /// Another instance holds the job lock; the run was skipped, not failed.
    #[must_use]
    pub fn skipped_locked() -> Self {
        let mut metrics = serde_json::Map::new();
        metrics.insert("skipped".to_string(), json!(true));
        metrics.insert("reason".to_string(), json!("lock_active"));
        Self {
            success: true,
            warnings: vec!["job_locked".to_string()],
            metrics,
            ..Self::default()
        }
    }

    /// First error message, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_locked_is_a_success_with_warning() {
        let result = JobResult::skipped_locked();
        assert!(result.success);
        assert_eq!(result.warnings, vec!["job_locked".to_string()]);
        assert_eq!(result.metrics["skipped"], json!(true));
        assert_eq!(result.metrics["reason"], json!("lock_active"));
    }

    #[test]
    fn validation_failure_prefixes_message() {
        let result = JobResult::validation_failure("job_id is empty");
        assert!(!result.success);
        assert_eq!(result.first_error(), Some("Validation: job_id is empty"));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(JobResult::default()).expect("serialize");
        assert!(json.get("productsProcessed").is_some());
        assert!(json.get("executionTimeMs").is_some());
    }
}
