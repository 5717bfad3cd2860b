//! Acting principal.
//!
//! The engine treats the caller's identity as an opaque token supplied by the
//! outer layers. It is recorded on every domain event and forwarded to hooks;
//! authentication and authorization happen elsewhere.

use serde::{Deserialize, Serialize};

/// Opaque identity of the caller performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Creates a principal from an opaque identity token.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The principal used when the caller supplied no identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self("anonymous".to_owned())
    }

    /// Returns the identity token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
