//! The hook invocation boundary.
//!
//! Hooks live in an external service (in the source system, an AI-generated
//! one). The engine assumes nothing about their implementation — only this
//! request/response contract and the pipeline's timeout rules.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::principal::Principal;
use tessera_core::record::FieldMap;
use tessera_schema::HookPoint;
use thiserror::Error;

/// Payload carried to the external hook endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HookRequest {
    /// Lifecycle point being executed.
    pub point: HookPoint,
    /// Name of the bound hook.
    pub hook: String,
    /// Entity of the mutated record.
    pub entity: String,
    /// Record fields before the mutation; absent for creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_before: Option<FieldMap>,
    /// Proposed (or committed) record fields after the mutation; absent for
    /// deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_after: Option<FieldMap>,
    /// Principal performing the mutation.
    pub principal: Principal,
}

/// Decision returned by a `before_*` hook.
#[derive(Debug, Clone, Deserialize)]
pub struct HookResponse {
    /// Whether the mutation may proceed.
    pub allow: bool,
    /// Rejection reason, surfaced verbatim to the caller.
    #[serde(default)]
    pub reason: Option<String>,
}

impl HookResponse {
    /// An allowing decision.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    /// A rejecting decision with the given reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
        }
    }
}

/// Failure to reach or understand the hook endpoint.
#[derive(Debug, Error)]
pub enum HookInvokeError {
    /// Connection, DNS, or I/O failure.
    #[error("hook transport error: {0}")]
    Transport(String),
    /// The endpoint answered with a non-success status.
    #[error("hook endpoint returned status {0}")]
    Status(u16),
    /// The endpoint's response body was not a valid decision.
    #[error("malformed hook response: {0}")]
    Malformed(String),
}

/// Pluggable capability for calling a named external hook.
#[async_trait]
pub trait HookInvoker: Send + Sync {
    /// Calls the hook and returns its decision (`before_*` points).
    async fn invoke(&self, request: HookRequest) -> Result<HookResponse, HookInvokeError>;

    /// Calls the hook for a bare acknowledgment (`after_*` points).
    async fn notify(&self, request: HookRequest) -> Result<(), HookInvokeError>;
}

/// Invoker that POSTs hook payloads to `{endpoint}/hooks/{name}`.
#[derive(Debug, Clone)]
pub struct HttpHookInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpHookInvoker {
    /// Creates an invoker for the given base endpoint.
    ///
    /// Timeouts are enforced by the pipeline, not the client, so a single
    /// client serves both the short `before_*` and the longer `after_*`
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns `HookInvokeError::Transport` if the HTTP client cannot be
    /// constructed.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, HookInvokeError> {
        let client = reqwest::Client::builder()
            .user_agent("tessera-engine")
            .build()
            .map_err(|e| HookInvokeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn post(&self, request: &HookRequest) -> Result<reqwest::Response, HookInvokeError> {
        let url = format!("{}/hooks/{}", self.endpoint, request.hook);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| HookInvokeError::Transport(e.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(HookInvokeError::Status(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl HookInvoker for HttpHookInvoker {
    async fn invoke(&self, request: HookRequest) -> Result<HookResponse, HookInvokeError> {
        let response = self.post(&request).await?;
        response
            .json::<HookResponse>()
            .await
            .map_err(|e| HookInvokeError::Malformed(e.to_string()))
    }

    async fn notify(&self, request: HookRequest) -> Result<(), HookInvokeError> {
        // A successful status is the acknowledgment; the body is ignored.
        self.post(&request).await.map(|_| ())
    }
}
