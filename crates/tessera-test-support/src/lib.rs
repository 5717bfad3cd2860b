//! Shared test mocks and utilities for the Tessera entity engine.

mod clock;
mod hooks;
mod schema;

pub use clock::FixedClock;
pub use hooks::{
    AllowingInvoker, FailingInvoker, HangingInvoker, RecordingInvoker, RejectingInvoker,
};
pub use schema::{orders_def, users_def};
