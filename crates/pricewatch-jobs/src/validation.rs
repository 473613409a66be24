//! Pre-flight checks every handler runs before touching the network.
//!
//! Failures are plain strings; handlers turn them into
//! `JobResult::validation_failure` and return without side effects.

use pricewatch_core::{JobExecutionContext, Parameters};
use pricewatch_db::StoreClient;
use serde_json::Value;

/// Checks the identity fields of a run context.
///
/// # Errors
///
/// Returns a description of the first malformed field.
pub fn validate_context(ctx: &JobExecutionContext) -> Result<(), String> {
    if ctx.job_id.trim().is_empty() {
        return Err("job_id is empty".to_string());
    }
    if ctx.execution_id.trim().is_empty() {
        return Err("execution_id is empty".to_string());
    }
    if !is_run_id(&ctx.run_id) {
        return Err(format!("run_id is malformed: {:?}", ctx.run_id));
    }
    Ok(())
}

/// `run_<digits>_<6 lowercase alphanumerics>`.
fn is_run_id(run_id: &str) -> bool {
    let Some(rest) = run_id.strip_prefix("run_") else {
        return false;
    };
    let Some((millis, suffix)) = rest.split_once('_') else {
        return false;
    };
    !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == 6
        && suffix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Checks that the store collaborator is usable.
///
/// # Errors
///
/// Returns a description when the base URL is not http(s) or the credential
/// is blank.
pub fn validate_env(store: &StoreClient) -> Result<(), String> {
    let base_url = store.base_url();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        return Err(format!("base URL must be http(s): {base_url:?}"));
    }
    if !store.has_credential() {
        return Err("service credential is empty".to_string());
    }
    Ok(())
}

/// Reads a positive integer parameter, falling back to `default` when the key
/// is absent and clamping to `cap`. Numeric strings are accepted.
///
/// # Errors
///
/// Returns a description when the value is present but not a positive
/// integer.
pub fn read_bounded_u64(
    params: &Parameters,
    key: &str,
    default: u64,
    cap: u64,
) -> Result<u64, String> {
    let value = match params.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| format!("parameter {key} must be a positive integer, got {n}"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("parameter {key} must be a positive integer, got {s:?}"))?,
        Some(other) => {
            return Err(format!(
                "parameter {key} must be a positive integer, got {other}"
            ))
        }
    };
    if value == 0 {
        return Err(format!("parameter {key} must be greater than zero"));
    }
    Ok(value.min(cap))
}

/// Reads a non-negative finite number parameter.
///
/// # Errors
///
/// Returns a description when the value is present but not a non-negative
/// number.
pub fn read_non_negative_f64(params: &Parameters, key: &str, default: f64) -> Result<f64, String> {
    let value = match params.get(key) {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(format!("parameter {key} must be a non-negative number")),
    }
}
