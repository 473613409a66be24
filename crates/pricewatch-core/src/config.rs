use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let supabase_url = require("SUPABASE_URL")?;
    if !(supabase_url.starts_with("http://") || supabase_url.starts_with("https://")) {
        return Err(invalid(
            "SUPABASE_URL",
            "must start with http:// or https://".to_string(),
        ));
    }
    let supabase_service_key = require("SUPABASE_SERVICE_ROLE_KEY")?;

    let env = parse_environment(&or_default("PRICEWATCH_ENV", "development"))?;

    let bind_addr = or_default("PRICEWATCH_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("PRICEWATCH_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("PRICEWATCH_LOG_LEVEL", "info");
    let jobs_path = lookup("PRICEWATCH_JOBS_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);

    let store_timeout_secs = parse_u64("PRICEWATCH_STORE_TIMEOUT_SECS", "30")?;
    if store_timeout_secs == 0 {
        return Err(invalid(
            "PRICEWATCH_STORE_TIMEOUT_SECS",
            "must be greater than zero".to_string(),
        ));
    }

    let circuit_open_timeout_secs = parse_u64("PRICEWATCH_CB_OPEN_TIMEOUT_SECS", "60")?;
    let circuit_success_threshold = parse_u32("PRICEWATCH_CB_SUCCESS_THRESHOLD", "2")?;
    if circuit_success_threshold == 0 {
        return Err(invalid(
            "PRICEWATCH_CB_SUCCESS_THRESHOLD",
            "must be at least 1".to_string(),
        ));
    }

    let rate_limit_max_requests = parse_usize("PRICEWATCH_RATE_LIMIT_MAX_REQUESTS", "60")?;
    let rate_limit_window_secs = parse_u64("PRICEWATCH_RATE_LIMIT_WINDOW_SECS", "60")?;
    let trust_forwarded_for = parse_bool(
        "PRICEWATCH_TRUST_FORWARDED_FOR",
        &or_default("PRICEWATCH_TRUST_FORWARDED_FOR", "false"),
    )?;
    let scheduler_enabled = parse_bool(
        "PRICEWATCH_SCHEDULER_ENABLED",
        &or_default("PRICEWATCH_SCHEDULER_ENABLED", "false"),
    )?;

    Ok(AppConfig {
        supabase_url,
        supabase_service_key,
        env,
        bind_addr,
        log_level,
        jobs_path,
        store_timeout_secs,
        circuit_open_timeout_secs,
        circuit_success_threshold,
        rate_limit_max_requests,
        rate_limit_window_secs,
        trust_forwarded_for,
        scheduler_enabled,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PRICEWATCH_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
