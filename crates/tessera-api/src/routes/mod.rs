//! Route modules.

pub mod health;
pub mod records;
pub mod schema;
pub mod subscribe;
