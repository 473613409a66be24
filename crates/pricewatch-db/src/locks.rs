//! Distributed job lock backed by two store RPCs.
//!
//! The lock is keyed by job id and held by an owner token (the run's
//! execution id). The store expires it after `lock_seconds`, which is the
//! only safety net when a release never arrives.

use std::future::Future;

use serde_json::{json, Value};
use thiserror::Error;

use crate::{StoreClient, StoreError};

const ACQUIRE_RPC: &str = "acquire_job_lock";
const RELEASE_RPC: &str = "release_job_lock";

#[derive(Debug, Error)]
pub enum LockError {
    /// The lock infrastructure is missing or unreachable (RPC not deployed,
    /// connection refused, timeout).
    #[error("lock infrastructure unavailable: {0}")]
    Unavailable(String),

    /// The RPC answered but with an error or an unexpected payload.
    #[error("lock RPC failed: {0}")]
    Rpc(String),
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } | StoreError::Http(_) => Self::Unavailable(err.to_string()),
            StoreError::UnexpectedStatus { .. }
            | StoreError::Deserialize { .. }
            | StoreError::MissingCount { .. } => Self::Rpc(err.to_string()),
        }
    }
}

/// Mutual exclusion for job runs across stateless process instances.
pub trait JobLock: Send + Sync + 'static {
    /// Tries to take the lock. `Ok(false)` means another owner holds it.
    fn acquire(
        &self,
        job_id: &str,
        lock_seconds: u64,
        owner: &str,
    ) -> impl Future<Output = Result<bool, LockError>> + Send;

    /// Releases the lock if `owner` still holds it.
    fn release(&self, job_id: &str, owner: &str)
        -> impl Future<Output = Result<(), LockError>> + Send;
}

/// [`JobLock`] calling `acquire_job_lock` / `release_job_lock` on the store.
#[derive(Debug, Clone)]
pub struct RpcJobLock {
    store: StoreClient,
}

impl RpcJobLock {
    #[must_use]
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }
}

impl JobLock for RpcJobLock {
    async fn acquire(
        &self,
        job_id: &str,
        lock_seconds: u64,
        owner: &str,
    ) -> Result<bool, LockError> {
        let request = self.store.post(&self.store.rpc_url(ACQUIRE_RPC)).json(&json!({
            "p_job_id": job_id,
            "p_lock_seconds": lock_seconds,
            "p_owner": owner,
        }));
        let body = self.store.send_json(request).await?;
        parse_acquired(&body)
    }

    async fn release(&self, job_id: &str, owner: &str) -> Result<(), LockError> {
        let request = self.store.post(&self.store.rpc_url(RELEASE_RPC)).json(&json!({
            "p_job_id": job_id,
            "p_owner": owner,
        }));
        self.store.send_json(request).await?;
        Ok(())
    }
}

/// PostgREST returns a scalar function result as a bare JSON value, but
/// some deployments wrap it as `[{"acquire_job_lock": true}]`.
fn parse_acquired(body: &Value) -> Result<bool, LockError> {
    match body {
        Value::Bool(acquired) => Ok(*acquired),
        Value::Array(items) if items.len() == 1 => parse_acquired(&items[0]),
        Value::Object(map) => match map.get(ACQUIRE_RPC) {
            Some(Value::Bool(acquired)) => Ok(*acquired),
            _ => Err(LockError::Rpc(format!("unexpected {ACQUIRE_RPC} response: {body}"))),
        },
        other => Err(LockError::Rpc(format!(
            "unexpected {ACQUIRE_RPC} response: {other}"
        ))),
    }
}
