//! HTTP client for the PostgREST-shaped store.
//!
//! Wraps `reqwest` with the credential headers every call needs and maps
//! non-2xx responses onto typed [`StoreError`] variants.

use std::time::Duration;

use reqwest::{header::CONTENT_RANGE, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::error::StoreError;

const USER_AGENT: &str = "pricewatch/0.1 (cron-engine)";

/// Client for the store's REST, RPC, and edge-function endpoints.
///
/// Construction never validates the base URL or credential; job handlers
/// check both before making any call so a misconfigured environment
/// surfaces as a validation failure instead of a network error.
#[derive(Debug, Clone)]
pub struct StoreClient {
    client: Client,
    base_url: String,
    credential: String,
}

impl StoreClient {
    /// Creates a client rooted at `base_url` (e.g. `https://xyz.supabase.co`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(base_url: &str, credential: &str, timeout_secs: u64) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            credential: credential.trim().to_owned(),
        })
    }

    /// Creates a client from the application config.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn from_app_config(config: &pricewatch_core::AppConfig) -> Result<Self, StoreError> {
        Self::new(
            &config.supabase_url,
            &config.supabase_service_key,
            config.store_timeout_secs,
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    pub(crate) fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{function}", self.base_url)
    }

    pub(crate) fn function_url(&self, path: &str) -> String {
        format!("{}/functions/v1/{path}", self.base_url)
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.authed(self.client.get(url))
    }

    pub(crate) fn head(&self, url: &str) -> RequestBuilder {
        self.authed(self.client.head(url))
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.authed(self.client.post(url))
    }

    pub(crate) fn delete(&self, url: &str) -> RequestBuilder {
        self.authed(self.client.delete(url))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.credential)
            .bearer_auth(&self.credential)
    }

    /// Sends `request` and asserts a 2xx status.
    async fn send_checked(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().to_string();

        if status == StatusCode::NOT_FOUND {
            tracing::debug!(url = %url, "store endpoint not found");
            return Err(StoreError::NotFound { url });
        }

        if !status.is_success() {
            let body = response.text().await?;
            tracing::debug!(status = status.as_u16(), url = %url, "store returned non-success status");
            return Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body: truncate_body(&body),
            });
        }

        Ok(response)
    }

    /// Sends `request`, asserts a 2xx status, and parses the body as JSON.
    ///
    /// An empty body parses as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] on HTTP 404.
    /// - [`StoreError::UnexpectedStatus`] on any other non-2xx status.
    /// - [`StoreError::Http`] on network failure.
    /// - [`StoreError::Deserialize`] if the body is not valid JSON.
    pub(crate) async fn send_json(&self, request: RequestBuilder) -> Result<Value, StoreError> {
        let response = self.send_checked(request).await?;
        let url = response.url().to_string();
        let body = response.text().await?;

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| StoreError::Deserialize {
            context: url,
            source: e,
        })
    }

    /// Sends `request` with `Prefer: count=exact` and reads the total from
    /// the `Content-Range` header (`0-24/3573` or `*/0`).
    ///
    /// # Errors
    ///
    /// Same as [`Self::send_json`], plus [`StoreError::MissingCount`] when
    /// the response has no usable `Content-Range` total.
    pub(crate) async fn send_count(&self, request: RequestBuilder) -> Result<u64, StoreError> {
        let response = self
            .send_checked(request.header("Prefer", "count=exact"))
            .await?;
        let url = response.url().to_string();

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total)
            .ok_or(StoreError::MissingCount { url })
    }

    /// Verifies the store is reachable with the configured credential.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the health check request fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let request = self
            .get(&self.rest_url(crate::execution_logs::TABLE))
            .query(&[("select", "id"), ("limit", "1")]);
        self.send_json(request).await?;
        Ok(())
    }
}

fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// Keeps error messages readable when the store returns an HTML error page.
fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 300;
    if body.chars().count() <= MAX_CHARS {
        body.to_owned()
    } else {
        let head: String = body.chars().take(MAX_CHARS).collect();
        format!("{head}...")
    }
}
