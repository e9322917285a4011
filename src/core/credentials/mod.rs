//! Ephemeral session credential exchange.
//!
//! The long-lived API secret never leaves this module; it is traded for a
//! short-lived session credential that authorizes exactly one negotiation.

mod client;
mod messages;

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

pub use client::CredentialBroker;
pub use messages::{ClientSecret, SessionRequest, SessionResponse};

/// Errors that can occur while acquiring a session credential.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The request could not be completed (network failure, TLS, etc.)
    #[error("credential request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint returned a non-success status. The body is surfaced
    /// verbatim; there is no retry.
    #[error("credential endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: reqwest::StatusCode,
        /// Response body, verbatim
        body: String,
    },

    /// The endpoint returned success but the body was missing an expected field
    #[error("credential response missing {0}")]
    MalformedResponse(&'static str),
}

/// Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Short-lived bearer token for establishing one session.
///
/// The secret is zeroized on drop and redacted from debug output; it is
/// never persisted.
pub struct Credential {
    secret: Zeroizing<String>,
}

impl Credential {
    pub(crate) fn new(secret: String) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }

    /// Borrow the secret for use in an authorization header.
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacted() {
        let credential = Credential::new("ek_secret_value".to_string());
        let formatted = format!("{credential:?}");
        assert!(!formatted.contains("ek_secret_value"));
        assert_eq!(credential.expose(), "ek_secret_value");
    }
}
