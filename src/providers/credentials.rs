//! Provider API credentials.
//!
//! Each provider reads its key from one named environment variable. A
//! missing variable fails client construction; there is no silent
//! downgrade to an unauthenticated client.

use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::error::{Error, Result};

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// The inner `SecretString` ensures the key value is:
/// - Zeroized in memory when dropped
/// - Never exposed via Debug or Display
/// - Only accessible via `.expose_secret()` (grep-auditable)
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Environment lookup function, closure-injected so credential resolution
/// is testable without touching global env state.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the real process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// Resolve a provider's API key from its named environment variable.
pub fn require_key(env: &EnvLookup, provider: &str, var: &str) -> Result<ApiKey> {
    match env(var) {
        Some(value) => Ok(ApiKey::from(value)),
        None => Err(Error::MissingCredential {
            provider: provider.to_string(),
            var: var.to_string(),
        }),
    }
}
