//! Credential endpoint request/response types.

use serde::{Deserialize, Serialize};

/// Body of the session-issuance request.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    /// Model to establish the session against
    pub model: String,
    /// Voice for synthesized audio
    pub voice: String,
}

/// Successful session-issuance response.
///
/// Fields beyond the ephemeral secret are optional; the endpoint is free to
/// add more without breaking the client.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    /// Session identifier
    #[serde(default)]
    pub id: Option<String>,
    /// The ephemeral secret
    #[serde(default)]
    pub client_secret: Option<ClientSecret>,
}

/// Nested ephemeral secret value.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    /// The bearer token value
    pub value: String,
    /// Issuer-defined expiry timestamp
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_request_serialization() {
        let request = SessionRequest {
            model: "gpt-4o-realtime-preview".to_string(),
            voice: "alloy".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"gpt-4o-realtime-preview\""));
        assert!(json.contains("\"voice\":\"alloy\""));
    }

    #[test]
    fn test_session_response_deserialization() {
        let json = r#"{
            "id": "sess_123",
            "object": "realtime.session",
            "client_secret": { "value": "ek_abc", "expires_at": 1735689600 }
        }"#;
        let response: SessionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id.as_deref(), Some("sess_123"));
        let secret = response.client_secret.unwrap();
        assert_eq!(secret.value, "ek_abc");
        assert_eq!(secret.expires_at, Some(1735689600));
    }

    #[test]
    fn test_session_response_missing_secret() {
        let response: SessionResponse = serde_json::from_str(r#"{"id":"sess_1"}"#).unwrap();
        assert!(response.client_secret.is_none());
    }
}
