//! Test hook invokers — scripted `HookInvoker` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use tessera_hooks::{HookInvokeError, HookInvoker, HookRequest, HookResponse};

/// An invoker that allows every mutation and acknowledges every after-hook.
#[derive(Debug)]
pub struct AllowingInvoker;

#[async_trait]
impl HookInvoker for AllowingInvoker {
    async fn invoke(&self, _request: HookRequest) -> Result<HookResponse, HookInvokeError> {
        Ok(HookResponse::allow())
    }

    async fn notify(&self, _request: HookRequest) -> Result<(), HookInvokeError> {
        Ok(())
    }
}

/// An invoker that rejects every `before_*` decision with a fixed reason and
/// fails every `after_*` acknowledgment.
#[derive(Debug)]
pub struct RejectingInvoker {
    reason: String,
}

impl RejectingInvoker {
    /// Creates an invoker rejecting with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl HookInvoker for RejectingInvoker {
    async fn invoke(&self, _request: HookRequest) -> Result<HookResponse, HookInvokeError> {
        Ok(HookResponse::reject(self.reason.clone()))
    }

    async fn notify(&self, _request: HookRequest) -> Result<(), HookInvokeError> {
        Err(HookInvokeError::Status(500))
    }
}

/// An invoker that never answers. Drives the fail-closed timeout paths.
#[derive(Debug)]
pub struct HangingInvoker;

#[async_trait]
impl HookInvoker for HangingInvoker {
    async fn invoke(&self, _request: HookRequest) -> Result<HookResponse, HookInvokeError> {
        std::future::pending().await
    }

    async fn notify(&self, _request: HookRequest) -> Result<(), HookInvokeError> {
        std::future::pending().await
    }
}

/// An invoker whose endpoint is unreachable.
#[derive(Debug)]
pub struct FailingInvoker;

#[async_trait]
impl HookInvoker for FailingInvoker {
    async fn invoke(&self, _request: HookRequest) -> Result<HookResponse, HookInvokeError> {
        Err(HookInvokeError::Transport("connection refused".into()))
    }

    async fn notify(&self, _request: HookRequest) -> Result<(), HookInvokeError> {
        Err(HookInvokeError::Transport("connection refused".into()))
    }
}

/// An invoker that records every request it receives and allows everything.
#[derive(Debug, Default)]
pub struct RecordingInvoker {
    requests: Mutex<Vec<HookRequest>>,
}

impl RecordingInvoker {
    /// Creates an empty recording invoker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the requests received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn requests(&self) -> Vec<HookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HookInvoker for RecordingInvoker {
    async fn invoke(&self, request: HookRequest) -> Result<HookResponse, HookInvokeError> {
        self.requests.lock().unwrap().push(request);
        Ok(HookResponse::allow())
    }

    async fn notify(&self, request: HookRequest) -> Result<(), HookInvokeError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}
