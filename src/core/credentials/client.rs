//! HTTP client for the session-issuance endpoint.

use tracing::{debug, info};
use zeroize::Zeroizing;

use super::messages::{SessionRequest, SessionResponse};
use super::{AuthError, AuthResult, Credential};

/// Path of the session-issuance endpoint, relative to the API base.
const SESSIONS_PATH: &str = "/v1/realtime/sessions";

/// Obtains a short-lived session credential from the remote authority.
///
/// Stateless beyond the HTTP client and the long-lived secret: one outbound
/// request per [`acquire`](CredentialBroker::acquire) call, no retries, and
/// the returned credential is the only thing handed out.
pub struct CredentialBroker {
    http: reqwest::Client,
    api_base: String,
    api_key: Zeroizing<String>,
}

impl CredentialBroker {
    /// Create a broker for the given API base URL and long-lived secret.
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let api_base = api_base.into();
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: Zeroizing::new(api_key.into()),
        }
    }

    /// Exchange the long-lived secret for an ephemeral session credential.
    ///
    /// Any non-success status is a terminal failure for this attempt, with
    /// the remote status and body surfaced to the caller. A success response
    /// missing the nested secret value fails with
    /// [`AuthError::MalformedResponse`].
    pub async fn acquire(&self, model: &str, voice: &str) -> AuthResult<Credential> {
        let url = format!("{}{}", self.api_base, SESSIONS_PATH);
        debug!(%model, %voice, "requesting session credential");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .json(&SessionRequest {
                model: model.to_string(),
                voice: voice.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::Status { status, body });
        }

        let parsed: SessionResponse = serde_json::from_str(&body)
            .map_err(|_| AuthError::MalformedResponse("session payload"))?;
        let secret = parsed
            .client_secret
            .ok_or(AuthError::MalformedResponse("client_secret.value"))?;

        info!(session_id = ?parsed.id, "session credential issued");
        Ok(Credential::new(secret.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let broker = CredentialBroker::new("https://api.example.com/", "sk-test");
        assert_eq!(broker.api_base, "https://api.example.com");
    }
}
