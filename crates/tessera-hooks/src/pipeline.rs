//! Ordering, timeout, and failure classification for hook execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tessera_core::error::EngineError;
use tessera_core::principal::Principal;
use tessera_core::record::FieldMap;
use tessera_schema::{EntityDef, HookPoint};
use tokio::task::JoinHandle;

use crate::invoker::{HookInvoker, HookRequest};

const DEFAULT_BEFORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_AFTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes configured pre- and post-mutation hooks.
pub struct HookPipeline {
    invoker: Arc<dyn HookInvoker>,
    before_timeout: Duration,
    after_timeout: Duration,
    after_failures: Arc<AtomicU64>,
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPipeline")
            .field("before_timeout", &self.before_timeout)
            .field("after_timeout", &self.after_timeout)
            .finish_non_exhaustive()
    }
}

impl HookPipeline {
    /// Creates a pipeline with the default timeouts.
    #[must_use]
    pub fn new(invoker: Arc<dyn HookInvoker>) -> Self {
        Self::with_timeouts(invoker, DEFAULT_BEFORE_TIMEOUT, DEFAULT_AFTER_TIMEOUT)
    }

    /// Creates a pipeline with explicit `before_*` and `after_*` budgets.
    #[must_use]
    pub fn with_timeouts(
        invoker: Arc<dyn HookInvoker>,
        before_timeout: Duration,
        after_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            before_timeout,
            after_timeout,
            after_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs the `before_*` hook bound to `point`, blocking the mutation until
    /// it answers.
    ///
    /// No bound hook is a no-op that always allows. A rejection, a timeout,
    /// or an unreachable endpoint aborts the mutation before any state
    /// change — fail-closed, so a dead hook service cannot cause silent
    /// state drift.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::HookRejected` when the hook declines, or
    /// `EngineError::HookTimeout` on expiry or transport failure.
    pub async fn run_before(
        &self,
        def: &EntityDef,
        point: HookPoint,
        before: Option<&FieldMap>,
        after: Option<&FieldMap>,
        principal: &Principal,
    ) -> Result<(), EngineError> {
        let Some(hook) = def.hook(point) else {
            return Ok(());
        };
        let request = build_request(def, point, hook, before, after, principal);

        match tokio::time::timeout(self.before_timeout, self.invoker.invoke(request)).await {
            Ok(Ok(response)) if response.allow => Ok(()),
            Ok(Ok(response)) => Err(EngineError::HookRejected {
                hook: hook.to_owned(),
                reason: response
                    .reason
                    .unwrap_or_else(|| "rejected by hook".to_owned()),
            }),
            Ok(Err(err)) => {
                tracing::warn!(hook, point = point.as_str(), error = %err, "before hook unreachable");
                Err(EngineError::HookTimeout {
                    hook: hook.to_owned(),
                })
            }
            Err(_elapsed) => {
                tracing::warn!(hook, point = point.as_str(), "before hook timed out");
                Err(EngineError::HookTimeout {
                    hook: hook.to_owned(),
                })
            }
        }
    }

    /// Launches the `after_*` hook bound to `point` on a detached task.
    ///
    /// Runs independently of the caller — once the mutation commits, the
    /// after-hook proceeds to completion or failure on its own and its result
    /// never affects the caller's response. Failures are recorded on the
    /// operational log and counted.
    ///
    /// Returns the task handle (mainly for tests); dropping it does not
    /// cancel the hook.
    pub fn run_after(
        &self,
        def: &EntityDef,
        point: HookPoint,
        before: Option<&FieldMap>,
        after: Option<&FieldMap>,
        principal: &Principal,
    ) -> Option<JoinHandle<()>> {
        let hook = def.hook(point)?.to_owned();
        let request = build_request(def, point, &hook, before, after, principal);
        let invoker = self.invoker.clone();
        let budget = self.after_timeout;
        let failures = self.after_failures.clone();

        Some(tokio::spawn(async move {
            match tokio::time::timeout(budget, invoker.notify(request)).await {
                Ok(Ok(())) => {
                    tracing::debug!(hook, point = point.as_str(), "after hook acknowledged");
                }
                Ok(Err(err)) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(hook, point = point.as_str(), error = %err, "after hook failed");
                }
                Err(_elapsed) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(hook, point = point.as_str(), "after hook timed out");
                }
            }
        }))
    }

    /// Number of after-hook failures recorded since startup.
    #[must_use]
    pub fn after_failures(&self) -> u64 {
        self.after_failures.load(Ordering::Relaxed)
    }
}

fn build_request(
    def: &EntityDef,
    point: HookPoint,
    hook: &str,
    before: Option<&FieldMap>,
    after: Option<&FieldMap>,
    principal: &Principal,
) -> HookRequest {
    HookRequest {
        point,
        hook: hook.to_owned(),
        entity: def.name().to_owned(),
        record_before: before.cloned(),
        record_after: after.cloned(),
        principal: principal.clone(),
    }
}
