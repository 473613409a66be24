//! Cron job orchestration: circuit breakers, the distributed-lock run
//! lifecycle, timeouts, the four pipeline job handlers, and the
//! execution-log writer they all share.

pub mod circuit_breaker;
mod error;
pub mod handlers;
pub mod logger;
mod orchestrator;
pub mod validation;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitDefaults, CircuitState,
};
pub use error::EngineError;
pub use handlers::JobDeps;
pub use logger::{ExecutionLogEntry, ExecutionLogger, LogStatus};
pub use orchestrator::{JobRun, Orchestrator};
pub use tokio_util::sync::CancellationToken;
