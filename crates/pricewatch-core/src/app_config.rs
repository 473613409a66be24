use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Optional YAML file replacing the built-in job table.
    pub jobs_path: Option<PathBuf>,
    pub store_timeout_secs: u64,
    pub circuit_open_timeout_secs: u64,
    pub circuit_success_threshold: u32,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
    /// Key rate limits on `x-forwarded-for` instead of the socket peer. Only
    /// safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    pub scheduler_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_service_key", &"[redacted]")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("jobs_path", &self.jobs_path)
            .field("store_timeout_secs", &self.store_timeout_secs)
            .field("circuit_open_timeout_secs", &self.circuit_open_timeout_secs)
            .field("circuit_success_threshold", &self.circuit_success_threshold)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("scheduler_enabled", &self.scheduler_enabled)
            .finish()
    }
}
