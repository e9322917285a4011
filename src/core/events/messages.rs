//! Control-channel message types.
//!
//! All events are JSON objects with a `type` discriminator, sent over the
//! peer connection's data channel.
//!
//! # Protocol Overview
//!
//! Client events (sent to the endpoint):
//! - response.create - Start a spoken exchange (modalities + instructions)
//! - response.cancel - Stop the current exchange
//! - input_audio_buffer.append - Append captured audio (base64 PCM16)
//!
//! Server events (received from the endpoint):
//! - session.created - Session established
//! - input_audio_buffer.speech_started / speech_stopped - Turn boundaries
//! - response.audio.delta / response.audio.done - Synthesized audio chunks
//! - response.audio_transcript.delta / done - Assistant transcript
//! - response.done - Exchange complete
//! - error - Endpoint-reported error
//!
//! Unrecognized types decode to [`ServerEvent::Unknown`] so that new event
//! types added by the endpoint never break the client.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::{EventError, EventResult};

// =============================================================================
// Client Events (sent to the endpoint)
// =============================================================================

/// Configuration carried by the `response.create` directive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Client events sent over the control channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Start a spoken exchange
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response configuration
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseConfig>,
    },

    /// Stop the current exchange
    #[serde(rename = "response.cancel")]
    ResponseCancel,

    /// Append captured audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },
}

impl ClientEvent {
    /// Create an audio append event from raw PCM16 bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// Create the directive that begins a spoken exchange.
    pub fn start_exchange(modalities: Vec<String>, instructions: Option<String>) -> Self {
        ClientEvent::ResponseCreate {
            response: Some(ResponseConfig {
                modalities: Some(modalities),
                instructions,
            }),
        }
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> EventResult<String> {
        serde_json::to_string(self).map_err(EventError::Encode)
    }
}

// =============================================================================
// Server Events (received from the endpoint)
// =============================================================================

/// Server events received over the control channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error reported by the endpoint
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session established
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session information
        session: SessionInfo,
    },

    /// Speech detected in the input audio
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        /// Audio start timestamp in ms
        audio_start_ms: u64,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Silence detected after speech
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        /// Audio end timestamp in ms
        audio_end_ms: u64,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Synthesized audio chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Response ID
        #[serde(default)]
        response_id: Option<String>,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
        /// Base64-encoded PCM16 audio
        delta: String,
    },

    /// Audio generation complete for the current item
    #[serde(rename = "response.audio.done")]
    AudioDone {
        /// Response ID
        #[serde(default)]
        response_id: Option<String>,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Assistant transcript chunk
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        /// Transcript delta
        delta: String,
    },

    /// Assistant transcript complete
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Full transcript
        transcript: String,
    },

    /// Exchange complete
    #[serde(rename = "response.done")]
    ResponseDone,

    /// Any event type this client does not recognize. Tolerated and logged,
    /// never fatal. Not a wire type; produced by [`ServerEvent::decode`].
    #[serde(skip)]
    Unknown {
        /// The `type` discriminator as received
        event_type: String,
        /// The full event payload
        payload: serde_json::Value,
    },
}

impl ServerEvent {
    /// Decode an inbound control message.
    ///
    /// Messages that are not JSON objects fail with [`EventError::Decode`].
    /// Well-formed events of an unrecognized type (or an unrecognized shape)
    /// decode to [`ServerEvent::Unknown`].
    pub fn decode(text: &str) -> EventResult<ServerEvent> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(EventError::Decode)?;
        match serde_json::from_value::<ServerEvent>(value.clone()) {
            Ok(event) => Ok(event),
            Err(_) => {
                let event_type = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown")
                    .to_owned();
                Ok(ServerEvent::Unknown {
                    event_type,
                    payload: value,
                })
            }
        }
    }

    /// Decode the base64 audio payload of an `AudioDelta` event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// Error information reported by the endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    pub message: String,
}

/// Session information from `session.created`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    /// Session ID
    pub id: String,
    /// Model serving the session
    #[serde(default)]
    pub model: Option<String>,
    /// Expiry timestamp
    #[serde(default)]
    pub expires_at: Option<u64>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_cancel_serialization() {
        let event = ClientEvent::ResponseCancel;
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("response.cancel"));
    }

    #[test]
    fn test_start_exchange_serialization() {
        let event = ClientEvent::start_exchange(
            vec!["text".to_string(), "audio".to_string()],
            Some("Be brief.".to_string()),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("response.create"));
        assert!(json.contains("\"modalities\":[\"text\",\"audio\"]"));
        assert!(json.contains("Be brief."));
    }

    #[test]
    fn test_audio_append_round_trip() {
        let data = vec![0u8, 1, 2, 3];
        let event = ClientEvent::audio_append(&data);
        match event {
            ClientEvent::InputAudioBufferAppend { audio } => {
                let decoded = BASE64_STANDARD.decode(&audio).unwrap();
                assert_eq!(decoded, data);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_server_error_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "message": "Test error"
            }
        }"#;
        let event = ServerEvent::decode(json).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.message, "Test error");
                assert_eq!(error.error_type.as_deref(), Some("invalid_request_error"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_audio_delta_deserialization() {
        let original = vec![0u8, 1, 2, 3, 4, 5];
        let json = format!(
            r#"{{"type":"response.audio.delta","response_id":"resp_1","item_id":"item_1","delta":"{}"}}"#,
            BASE64_STANDARD.encode(&original)
        );
        match ServerEvent::decode(&json).unwrap() {
            ServerEvent::AudioDelta { delta, item_id, .. } => {
                assert_eq!(item_id.as_deref(), Some("item_1"));
                assert_eq!(ServerEvent::decode_audio_delta(&delta).unwrap(), original);
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_tolerated() {
        let json = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        match ServerEvent::decode(json).unwrap() {
            ServerEvent::Unknown { event_type, .. } => {
                assert_eq!(event_type, "rate_limits.updated");
            }
            other => panic!("Expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_non_json_message_fails() {
        assert!(matches!(
            ServerEvent::decode("not json"),
            Err(EventError::Decode(_))
        ));
    }

    #[test]
    fn test_extra_fields_ignored() {
        let json = r#"{"type":"response.done","event_id":"ev_42","response":{"id":"r"}}"#;
        assert!(matches!(
            ServerEvent::decode(json).unwrap(),
            ServerEvent::ResponseDone
        ));
    }
}
