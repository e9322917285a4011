//! Transport seam between the conversation controller and the peer
//! connection machinery.
//!
//! `PeerTransport` is the production implementation: it owns the negotiator,
//! the connection monitor, and the control channel for one conversation, and
//! releases them together on close.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::core::credentials::Credential;
use crate::core::events::{ClientEvent, EventChannel, EventError, EventResult, ServerEvent};
use crate::core::peer::{ConnectionMonitor, NegotiationError, NegotiationResult, SessionNegotiator};

/// Label of the control data channel.
const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Establishes and tears down the media/control transport for one
/// conversation at a time.
#[async_trait]
pub trait ConversationTransport: Send {
    /// Run the full negotiation sequence with the given credential and wait
    /// for the control channel to open. On failure nothing stays wired.
    async fn establish(&mut self, credential: Credential) -> NegotiationResult<()>;

    /// Send a control event. Fails with [`EventError::ChannelNotReady`] when
    /// no established channel exists.
    async fn send_event(&self, event: &ClientEvent) -> EventResult<()>;

    /// Take the inbound event receiver for the established session.
    fn take_events(&mut self) -> Option<mpsc::Receiver<ServerEvent>>;

    /// Release the connection and everything attached to it. Idempotent.
    async fn close(&mut self);
}

struct EstablishedSession {
    negotiator: SessionNegotiator,
    channel: EventChannel,
    monitor_task: JoinHandle<()>,
}

/// WebRTC-backed transport: peer connection + data channel + monitor.
pub struct PeerTransport {
    api_base: String,
    model: String,
    session: Option<EstablishedSession>,
}

impl PeerTransport {
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            model: model.into(),
            session: None,
        }
    }
}

#[async_trait]
impl ConversationTransport for PeerTransport {
    async fn establish(&mut self, credential: Credential) -> NegotiationResult<()> {
        if self.session.is_some() {
            return Err(NegotiationError::Sequencing("transport already established"));
        }

        let mut negotiator = SessionNegotiator::new(&self.api_base, &self.model).await?;

        // Channel and observers attach before the offer so they are part of
        // the negotiated session.
        let data_channel = negotiator
            .connection()
            .create_data_channel(CONTROL_CHANNEL_LABEL, None)
            .await?;
        let channel = EventChannel::new(data_channel);
        let mut monitor = ConnectionMonitor::attach(&negotiator.connection());
        let monitor_task = tokio::spawn(async move {
            while let Some(transition) = monitor.next().await {
                info!(%transition, "transport state");
            }
        });

        let sequence = async {
            let offer = negotiator.create_offer().await?;
            let answer = negotiator.negotiate(&offer, &credential).await?;
            negotiator.apply_answer(answer).await?;
            Ok::<(), NegotiationError>(())
        };

        match sequence.await {
            Ok(()) => {
                channel.ready().await;
                self.session = Some(EstablishedSession {
                    negotiator,
                    channel,
                    monitor_task,
                });
                Ok(())
            }
            Err(e) => {
                monitor_task.abort();
                negotiator.close().await;
                Err(e)
            }
        }
    }

    async fn send_event(&self, event: &ClientEvent) -> EventResult<()> {
        match &self.session {
            Some(session) => session.channel.send(event).await,
            None => Err(EventError::ChannelNotReady),
        }
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.session
            .as_mut()
            .and_then(|session| session.channel.take_events())
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.monitor_task.abort();
            session.channel.close().await;
            session.negotiator.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_session_fails() {
        let transport = PeerTransport::new("https://api.example.com", "test-model");
        match transport.send_event(&ClientEvent::ResponseCancel).await {
            Err(EventError::ChannelNotReady) => {}
            other => panic!("Expected ChannelNotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_take_events_without_session() {
        let mut transport = PeerTransport::new("https://api.example.com", "test-model");
        assert!(transport.take_events().is_none());
    }

    #[tokio::test]
    async fn test_close_without_session_is_noop() {
        let mut transport = PeerTransport::new("https://api.example.com", "test-model");
        transport.close().await;
        transport.close().await;
    }
}
