//! Session description negotiation against the remote signaling endpoint.
//!
//! One `SessionNegotiator` owns one peer connection for one connection
//! attempt. The offer/exchange/apply sequence must run exactly once and in
//! order; violations fail fast with a sequencing error rather than leaving
//! the connection in a half-negotiated state.

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;

use crate::core::credentials::Credential;

/// Path of the signaling endpoint, relative to the API base.
const SIGNALING_PATH: &str = "/v1/realtime";

/// Errors that can occur during session negotiation.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// Peer connection or session description failure
    #[error("peer connection: {0}")]
    Webrtc(#[from] webrtc::Error),

    /// The signaling request could not be completed
    #[error("signaling request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The signaling endpoint returned a non-success status. The body is
    /// surfaced verbatim; there is no retry.
    #[error("signaling endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: reqwest::StatusCode,
        /// Response body, verbatim
        body: String,
    },

    /// An operation was invoked out of the create -> negotiate -> apply order
    #[error("negotiation out of sequence: {0}")]
    Sequencing(&'static str),
}

/// Result type for negotiation operations.
pub type NegotiationResult<T> = Result<T, NegotiationError>;

/// Where this connection attempt is in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    OfferCreated,
    Negotiated,
    Applied,
}

/// Builds the local offer, exchanges it with the signaling endpoint, and
/// commits the remote answer to the peer connection.
pub struct SessionNegotiator {
    connection: Arc<RTCPeerConnection>,
    http: reqwest::Client,
    api_base: String,
    model: String,
    phase: Phase,
}

impl SessionNegotiator {
    /// Create a negotiator with a fresh peer connection.
    pub async fn new(api_base: impl Into<String>, model: impl Into<String>) -> NegotiationResult<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();
        let connection = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await?,
        );

        let api_base: String = api_base.into();
        Ok(Self {
            connection,
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.into(),
            phase: Phase::New,
        })
    }

    /// The peer connection owned by this negotiator.
    ///
    /// Data channels and observers must be attached before
    /// [`create_offer`](Self::create_offer) so they are part of the offer.
    pub fn connection(&self) -> Arc<RTCPeerConnection> {
        self.connection.clone()
    }

    /// Generate the local offer declaring bidirectional audio, set it as the
    /// local description, and wait for ICE gathering to complete so the
    /// returned description carries all candidates.
    pub async fn create_offer(&mut self) -> NegotiationResult<RTCSessionDescription> {
        if self.phase != Phase::New {
            return Err(NegotiationError::Sequencing("offer already created"));
        }

        self.connection
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendrecv,
                    send_encodings: vec![],
                }),
            )
            .await?;

        let offer = self.connection.create_offer(None).await?;
        let mut gathering_done = self.connection.gathering_complete_promise().await;
        self.connection.set_local_description(offer).await?;
        let _ = gathering_done.recv().await;

        let local = self
            .connection
            .local_description()
            .await
            .ok_or(NegotiationError::Sequencing("local description not set"))?;

        debug!(sdp_bytes = local.sdp.len(), "local offer created");
        self.phase = Phase::OfferCreated;
        Ok(local)
    }

    /// Send the offer to the signaling endpoint and return the remote answer.
    pub async fn negotiate(
        &mut self,
        offer: &RTCSessionDescription,
        credential: &Credential,
    ) -> NegotiationResult<RTCSessionDescription> {
        if self.phase != Phase::OfferCreated {
            return Err(NegotiationError::Sequencing("negotiate requires a local offer"));
        }

        let url = format!("{}{}?model={}", self.api_base, SIGNALING_PATH, self.model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer.sdp.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NegotiationError::Status { status, body });
        }

        let answer = RTCSessionDescription::answer(body)?;
        info!(model = %self.model, "remote answer received");
        self.phase = Phase::Negotiated;
        Ok(answer)
    }

    /// Commit the remote answer to the peer connection. Valid exactly once,
    /// after a successful [`negotiate`](Self::negotiate).
    pub async fn apply_answer(&mut self, answer: RTCSessionDescription) -> NegotiationResult<()> {
        match self.phase {
            Phase::Negotiated => {}
            Phase::Applied => {
                return Err(NegotiationError::Sequencing("answer already applied"));
            }
            _ => {
                return Err(NegotiationError::Sequencing("no negotiated answer to apply"));
            }
        }

        self.connection.set_remote_description(answer).await?;
        self.phase = Phase::Applied;
        debug!("remote answer applied");
        Ok(())
    }

    /// Close and discard the peer connection. The negotiator is not reusable
    /// afterwards.
    pub async fn close(&mut self) {
        if let Err(e) = self.connection.close().await {
            warn!("peer connection close failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder_answer() -> RTCSessionDescription {
        let sdp = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n".to_string();
        RTCSessionDescription::answer(sdp).expect("minimal SDP")
    }

    #[tokio::test]
    async fn test_apply_before_offer_fails_fast() {
        let mut negotiator = SessionNegotiator::new("https://api.example.com", "test-model")
            .await
            .unwrap();
        match negotiator.apply_answer(placeholder_answer()).await {
            Err(NegotiationError::Sequencing(_)) => {}
            other => panic!("Expected Sequencing error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_double_offer_fails_fast() {
        let mut negotiator = SessionNegotiator::new("https://api.example.com", "test-model")
            .await
            .unwrap();
        negotiator.create_offer().await.unwrap();
        match negotiator.create_offer().await {
            Err(NegotiationError::Sequencing(_)) => {}
            other => panic!("Expected Sequencing error, got {other:?}"),
        }
        negotiator.close().await;
    }

    #[tokio::test]
    async fn test_offer_declares_audio() {
        let mut negotiator = SessionNegotiator::new("https://api.example.com", "test-model")
            .await
            .unwrap();
        let offer = negotiator.create_offer().await.unwrap();
        assert!(offer.sdp.contains("m=audio"));
        negotiator.close().await;
    }
}
