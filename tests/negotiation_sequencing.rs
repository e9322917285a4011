//! End-to-end negotiation sequencing: a local answering peer produces a real
//! answer, the signaling endpoint is mocked, and the create -> negotiate ->
//! apply contract is exercised against it.

use std::sync::Arc;

use voicelink::{NegotiationError, SessionNegotiator};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION_BODY: &str = r#"{"id":"sess_1","client_secret":{"value":"ek_test"}}"#;

async fn answering_peer() -> Arc<RTCPeerConnection> {
    let mut media = MediaEngine::default();
    media.register_default_codecs().unwrap();
    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media).unwrap();
    let api = APIBuilder::new()
        .with_media_engine(media)
        .with_interceptor_registry(registry)
        .build();
    Arc::new(
        api.new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap(),
    )
}

/// Produce a complete answer for the given offer SDP.
async fn answer_for(offer_sdp: String, answerer: &RTCPeerConnection) -> String {
    let offer = RTCSessionDescription::offer(offer_sdp).unwrap();
    answerer.set_remote_description(offer).await.unwrap();
    let answer = answerer.create_answer(None).await.unwrap();
    let mut gathering_done = answerer.gathering_complete_promise().await;
    answerer.set_local_description(answer).await.unwrap();
    let _ = gathering_done.recv().await;
    answerer.local_description().await.unwrap().sdp
}

#[tokio::test]
async fn answer_applies_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SESSION_BODY))
        .mount(&server)
        .await;

    let broker = voicelink::CredentialBroker::new(server.uri(), "sk-test");
    let credential = broker.acquire("test-model", "alloy").await.unwrap();

    let mut negotiator = SessionNegotiator::new(server.uri(), "test-model")
        .await
        .unwrap();
    let offer = negotiator.create_offer().await.unwrap();
    assert!(offer.sdp.contains("m=audio"));

    // Answer comes from a real peer so the remote description is valid.
    let answerer = answering_peer().await;
    let answer_sdp = answer_for(offer.sdp.clone(), &answerer).await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .respond_with(ResponseTemplate::new(200).set_body_string(answer_sdp))
        .mount(&server)
        .await;

    let answer = negotiator.negotiate(&offer, &credential).await.unwrap();
    negotiator.apply_answer(answer.clone()).await.unwrap();

    match negotiator.apply_answer(answer).await {
        Err(NegotiationError::Sequencing(_)) => {}
        other => panic!("Expected Sequencing error, got {other:?}"),
    }

    negotiator.close().await;
    answerer.close().await.unwrap();
}

#[tokio::test]
async fn negotiate_requires_offer_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SESSION_BODY))
        .mount(&server)
        .await;

    let broker = voicelink::CredentialBroker::new(server.uri(), "sk-test");
    let credential = broker.acquire("test-model", "alloy").await.unwrap();

    let mut negotiator = SessionNegotiator::new(server.uri(), "test-model")
        .await
        .unwrap();
    let unrelated =
        RTCSessionDescription::offer("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n".into())
            .unwrap();
    match negotiator.negotiate(&unrelated, &credential).await {
        Err(NegotiationError::Sequencing(_)) => {}
        other => panic!("Expected Sequencing error, got {other:?}"),
    }
    negotiator.close().await;
}
