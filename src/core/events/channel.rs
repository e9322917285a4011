//! Control channel bound to a WebRTC data channel.
//!
//! Inbound messages are decoded and delivered in arrival order on a bounded
//! queue; there is no acknowledgement layer on top of the data channel's own
//! ordering guarantee. Sending before the channel reports open fails with
//! [`EventError::ChannelNotReady`] and is never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;

use super::messages::{ClientEvent, ServerEvent};
use super::{EventError, EventResult};

/// Queue capacity for inbound control events.
const INBOUND_BUFFER: usize = 256;

/// Ordered, reliable control-message channel over an `RTCDataChannel`.
///
/// One `EventChannel` exists per peer connection. The inbound receiver is
/// taken once with [`take_events`](EventChannel::take_events) and lives for
/// the lifetime of the channel.
pub struct EventChannel {
    channel: Arc<RTCDataChannel>,
    open: Arc<AtomicBool>,
    opened: Arc<Notify>,
    inbound: Option<mpsc::Receiver<ServerEvent>>,
}

impl EventChannel {
    /// Bind to a data channel and start decoding inbound messages.
    pub fn new(channel: Arc<RTCDataChannel>) -> Self {
        let open = Arc::new(AtomicBool::new(false));
        let opened = Arc::new(Notify::new());
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

        {
            let open = open.clone();
            let opened = opened.clone();
            channel.on_open(Box::new(move || {
                debug!("control channel open");
                open.store(true, Ordering::SeqCst);
                opened.notify_waiters();
                Box::pin(async {})
            }));
        }

        {
            let open = open.clone();
            channel.on_close(Box::new(move || {
                debug!("control channel closed");
                open.store(false, Ordering::SeqCst);
                Box::pin(async {})
            }));
        }

        // Messages are handled one at a time in arrival order; awaiting the
        // queue send inside the handler preserves that order end to end.
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let inbound_tx = inbound_tx.clone();
            Box::pin(async move {
                let text = match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("non-UTF-8 control message dropped: {e}");
                        return;
                    }
                };
                match ServerEvent::decode(&text) {
                    Ok(event) => {
                        if let ServerEvent::Unknown { event_type, .. } = &event {
                            debug!(%event_type, "unrecognized control event");
                        }
                        if inbound_tx.send(event).await.is_err() {
                            debug!("control event receiver dropped");
                        }
                    }
                    Err(e) => {
                        warn!("undecodable control message dropped: {e}");
                    }
                }
            })
        }));

        Self {
            channel,
            open,
            opened,
            inbound: Some(inbound_rx),
        }
    }

    /// Whether the channel has reported open and not yet closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Wait until the channel reports open.
    pub async fn ready(&self) {
        while !self.is_open() {
            let notified = self.opened.notified();
            if self.is_open() {
                break;
            }
            notified.await;
        }
    }

    /// Send an event over the channel.
    ///
    /// Fails with [`EventError::ChannelNotReady`] if the channel has not
    /// reported open; the event is not queued.
    pub async fn send(&self, event: &ClientEvent) -> EventResult<()> {
        if !self.is_open() {
            return Err(EventError::ChannelNotReady);
        }
        let json = event.encode()?;
        self.channel
            .send_text(json)
            .await
            .map_err(|e| EventError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Take the inbound event receiver. Yields events in arrival order for
    /// the lifetime of the channel; can be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.inbound.take()
    }

    /// Close the underlying data channel.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close().await {
            warn!("data channel close failed: {e}");
        }
        self.open.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    async fn unopened_channel() -> EventChannel {
        let api = APIBuilder::new().build();
        let connection = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .expect("peer connection");
        let data_channel = connection
            .create_data_channel("oai-events", None)
            .await
            .expect("data channel");
        EventChannel::new(data_channel)
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let channel = unopened_channel().await;
        assert!(!channel.is_open());
        match channel.send(&ClientEvent::ResponseCancel).await {
            Err(EventError::ChannelNotReady) => {}
            other => panic!("Expected ChannelNotReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_receiver_taken_once() {
        let mut channel = unopened_channel().await;
        assert!(channel.take_events().is_some());
        assert!(channel.take_events().is_none());
    }
}
