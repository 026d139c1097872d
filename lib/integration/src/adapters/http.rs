//! The HTTP request adapter.
//!
//! Config:
//!
//! | key            | meaning                                           |
//! |----------------|---------------------------------------------------|
//! | `url`          | request URL (required)                            |
//! | `method`       | HTTP method, default `GET`                        |
//! | `headers`      | object of header name to string value             |
//! | `query`        | object of query parameter to scalar value         |
//! | `body`         | JSON request body                                 |
//! | `credentialId` | credential to authenticate with, for this tenant  |
//! | `timeoutMs`    | per-request timeout                               |
//!
//! Output is `{ status, headers, body }`, with `body` decoded as JSON when
//! possible. A non-2xx status is a failure.

use crate::adapter::{Adapter, AdapterInfo, ExecutionContext};
use crate::credential::{CredentialData, CredentialLookup};
use crate::error::AdapterError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use rootcause::prelude::Report;
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::CredentialId;
use switchyard_resolver::Version;
use tracing::{debug, instrument};

/// Connector id of the HTTP adapter.
pub const CONNECTOR_ID: &str = "core.httpRequest";

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Performs an HTTP call.
#[derive(Clone)]
pub struct HttpRequestAdapter {
    version: Version,
    client: Client,
    credentials: Arc<dyn CredentialLookup>,
}

impl HttpRequestAdapter {
    #[must_use]
    pub fn new(version: Version, client: Client, credentials: Arc<dyn CredentialLookup>) -> Self {
        Self {
            version,
            client,
            credentials,
        }
    }

    async fn authenticate(
        &self,
        request: RequestBuilder,
        ctx: &ExecutionContext,
    ) -> Result<RequestBuilder, Report<AdapterError>> {
        let Some(raw) = ctx.config_str("credentialId") else {
            return Ok(request);
        };
        let id: CredentialId = raw.parse().map_err(|e| AdapterError::InvalidConfig {
            reason: format!("credentialId: {e}"),
        })?;

        let data = self
            .credentials
            .lookup(id, ctx.tenant_id)
            .await
            .map_err(|report| AdapterError::AuthenticationFailed {
                reason: report.to_string(),
            })?;

        if data.is_expired() {
            return Err(AdapterError::AuthenticationFailed {
                reason: format!("credential {id} has expired"),
            }
            .into());
        }

        Ok(match data {
            CredentialData::Oauth2 {
                access_token,
                token_type,
                ..
            } => request.header("Authorization", format!("{token_type} {access_token}")),
            CredentialData::BearerToken { token } => request.bearer_auth(token),
            CredentialData::ApiKey { key, header_name } => request.header(
                header_name.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER),
                key,
            ),
            CredentialData::BasicAuth { username, password } => {
                request.basic_auth(username, Some(password))
            }
        })
    }
}

fn method(ctx: &ExecutionContext) -> Result<Method, Report<AdapterError>> {
    let raw = ctx.config_str("method").unwrap_or("GET");
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).map_err(|_| {
        AdapterError::InvalidConfig {
            reason: format!("unsupported method '{raw}'"),
        }
        .into()
    })
}

fn scalar_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn classify(error: &reqwest::Error) -> AdapterError {
    if error.is_timeout() {
        AdapterError::Timeout
    } else {
        AdapterError::ConnectionFailed {
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl Adapter for HttpRequestAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            connector_id: CONNECTOR_ID.to_string(),
            version: self.version.to_string(),
            description: "Performs an HTTP request".to_string(),
        }
    }

    #[instrument(skip_all, fields(node_id = %ctx.run.node_id))]
    async fn execute(&self, ctx: &ExecutionContext) -> Result<JsonValue, Report<AdapterError>> {
        let url = ctx.require_str("url")?;
        let method = method(ctx)?;
        let mut request = self.client.request(method.clone(), url);

        if let Some(headers) = ctx.config.get("headers").and_then(JsonValue::as_object) {
            for (name, value) in headers {
                request = request.header(name.as_str(), scalar_to_string(value));
            }
        }
        if let Some(query) = ctx.config.get("query").and_then(JsonValue::as_object) {
            let pairs: Vec<(&str, String)> = query
                .iter()
                .map(|(k, v)| (k.as_str(), scalar_to_string(v)))
                .collect();
            request = request.query(&pairs);
        }
        if let Some(body) = ctx.config.get("body") {
            request = request.json(body);
        }
        if let Some(timeout_ms) = ctx.config.get("timeoutMs").and_then(JsonValue::as_u64) {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let request = self.authenticate(request, ctx).await?;
        let response = request.send().await.map_err(|e| classify(&e))?;

        let status = response.status();
        debug!(%method, url, status = status.as_u16(), "http request completed");

        let headers: Map<String, JsonValue> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), JsonValue::String(v.to_string())))
            })
            .collect();
        let text = response.text().await.map_err(|e| classify(&e))?;

        if !status.is_success() {
            return Err(AdapterError::RequestFailed {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .map_or_else(|| text.clone(), str::to_string),
            }
            .into());
        }

        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));
        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        }))
    }
}
