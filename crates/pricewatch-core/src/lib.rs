mod app_config;
mod config;
pub mod context;
pub mod jobs;
pub mod result;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use context::{
    create_execution_context, new_run_id, ExecutionSource, JobExecutionContext, Parameters,
};
pub use jobs::{JobConfig, JobKind, JobRegistry, JobType};
pub use result::JobResult;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read jobs file {path}: {source}")]
    JobsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse jobs file: {0}")]
    JobsFileParse(#[from] serde_yaml::Error),

    #[error("job config validation failed: {0}")]
    Validation(String),
}
