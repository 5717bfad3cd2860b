//! Tessera Hooks — orchestration of external lifecycle hooks.
//!
//! The pipeline contains no business logic. It resolves the hook bound to a
//! lifecycle point, invokes the external endpoint with the record payload,
//! and enforces the ordering, timeout, and failure-classification rules:
//! `before_*` hooks are synchronous and fail-closed, `after_*` hooks are
//! fire-and-forget and can never roll back a committed mutation.

mod invoker;
mod pipeline;

pub use invoker::{HookInvokeError, HookInvoker, HookRequest, HookResponse, HttpHookInvoker};
pub use pipeline::HookPipeline;
