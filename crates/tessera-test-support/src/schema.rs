//! Canned entity definitions used across the test suites.

use tessera_schema::{EntityDef, FieldDef, HookPoint};

/// A `users` entity: required unique `name`, optional integer `age`.
///
/// # Panics
///
/// Panics if the definition fails to build, which would be a bug in the
/// fixture itself.
#[must_use]
pub fn users_def() -> EntityDef {
    EntityDef::builder("users")
        .field(FieldDef::string("name").required().unique())
        .field(FieldDef::integer("age"))
        .build()
        .expect("users fixture definition must build")
}

/// An `orders` entity with a `before_create` guard hook, mirroring the
/// rejecting-hook scenario: creating a negative amount is declined with
/// "amount must be positive".
///
/// # Panics
///
/// Panics if the definition fails to build, which would be a bug in the
/// fixture itself.
#[must_use]
pub fn orders_def() -> EntityDef {
    EntityDef::builder("orders")
        .field(FieldDef::decimal("amount").required())
        .hook(HookPoint::BeforeCreate, "require_positive_amount")
        .build()
        .expect("orders fixture definition must build")
}
