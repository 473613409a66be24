use pricewatch_core::JobResult;
use thiserror::Error;

/// Why `execute_job` did not produce a successful run.
///
/// `Timeout` and `Failed` carry the run and execution ids and the (failed)
/// result so that callers can report them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job disabled: {0}")]
    Disabled(String),

    #[error("Circuit breaker open for job: {0}")]
    CircuitOpen(String),

    #[error("Job timeout")]
    Timeout {
        job_id: String,
        run_id: String,
        execution_id: String,
        timeout_ms: u64,
        result: Box<JobResult>,
    },

    #[error("{}", .result.first_error().unwrap_or("Job failed"))]
    Failed {
        job_id: String,
        run_id: String,
        execution_id: String,
        result: Box<JobResult>,
    },
}

impl EngineError {
    #[must_use]
    pub fn job_id(&self) -> &str {
        match self {
            EngineError::NotFound(id) | EngineError::Disabled(id) | EngineError::CircuitOpen(id) => {
                id
            }
            EngineError::Timeout { job_id, .. } | EngineError::Failed { job_id, .. } => job_id,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        match self {
            EngineError::Timeout { run_id, .. } | EngineError::Failed { run_id, .. } => {
                Some(run_id)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            EngineError::Timeout { execution_id, .. } | EngineError::Failed { execution_id, .. } => {
                Some(execution_id)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&JobResult> {
        match self {
            EngineError::Timeout { result, .. } | EngineError::Failed { result, .. } => {
                Some(result)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_displays_first_handler_error() {
        let err = EngineError::Failed {
            job_id: "daily_price_update".to_string(),
            run_id: "run_1_abcdef".to_string(),
            execution_id: "exec-1".to_string(),
            result: Box::new(JobResult::failure("Scraper failed: boom", 12)),
        };
        assert_eq!(err.to_string(), "Scraper failed: boom");
        assert_eq!(err.run_id(), Some("run_1_abcdef"));
        assert_eq!(err.execution_id(), Some("exec-1"));
    }

    #[test]
    fn failed_without_errors_falls_back_to_generic_message() {
        let err = EngineError::Failed {
            job_id: "x".to_string(),
            run_id: "run_1_abcdef".to_string(),
            execution_id: "exec-2".to_string(),
            result: Box::default(),
        };
        assert_eq!(err.to_string(), "Job failed");
    }

    #[test]
    fn gate_errors_name_the_job() {
        assert_eq!(
            EngineError::NotFound("nope".to_string()).to_string(),
            "Job not found: nope"
        );
        assert_eq!(
            EngineError::CircuitOpen("daily_price_update".to_string()).to_string(),
            "Circuit breaker open for job: daily_price_update"
        );
        assert!(EngineError::Disabled("x".to_string()).run_id().is_none());
        assert!(EngineError::NotFound("x".to_string()).execution_id().is_none());
    }
}
