//! Passive peer-connection and ICE state observer.
//!
//! Transitions are delivered in the order they occur, with consecutive
//! duplicates of the same state suppressed. Nothing here reacts to failure
//! or disconnection; transitions are surfaced for logging and health checks
//! only.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Queue capacity for state transitions.
const TRANSITION_BUFFER: usize = 64;

/// A connectivity state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Peer connection state changed
    Connection(RTCPeerConnectionState),
    /// ICE connection state changed
    Ice(RTCIceConnectionState),
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::Connection(state) => write!(f, "connection {state}"),
            TransportEvent::Ice(state) => write!(f, "ice {state}"),
        }
    }
}

/// Records `next` as the latest observed state; returns false when it equals
/// the previously observed value (a consecutive duplicate to suppress).
fn transition<S: Copy + PartialEq>(last: &Mutex<Option<S>>, next: S) -> bool {
    let mut last = last.lock();
    if *last == Some(next) {
        return false;
    }
    *last = Some(next);
    true
}

/// Observes connection and ICE state transitions on a peer connection.
pub struct ConnectionMonitor {
    events: mpsc::Receiver<TransportEvent>,
}

impl ConnectionMonitor {
    /// Attach state-change observers to the peer connection.
    pub fn attach(connection: &RTCPeerConnection) -> Self {
        let (tx, rx) = mpsc::channel(TRANSITION_BUFFER);

        {
            let tx = tx.clone();
            let last = Arc::new(Mutex::new(None::<RTCPeerConnectionState>));
            connection.on_peer_connection_state_change(Box::new(move |state| {
                let tx = tx.clone();
                let last = last.clone();
                Box::pin(async move {
                    if !transition(&last, state) {
                        return;
                    }
                    if tx.try_send(TransportEvent::Connection(state)).is_err() {
                        warn!(%state, "connection state transition dropped");
                    }
                })
            }));
        }

        {
            let last = Arc::new(Mutex::new(None::<RTCIceConnectionState>));
            connection.on_ice_connection_state_change(Box::new(move |state| {
                let tx = tx.clone();
                let last = last.clone();
                Box::pin(async move {
                    if !transition(&last, state) {
                        return;
                    }
                    if tx.try_send(TransportEvent::Ice(state)).is_err() {
                        warn!(%state, "ice state transition dropped");
                    }
                })
            }));
        }

        Self { events: rx }
    }

    /// Next state transition, in occurrence order. `None` once the peer
    /// connection is gone.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_suppresses_consecutive_duplicates() {
        let last = Mutex::new(None);
        assert!(transition(&last, RTCIceConnectionState::Checking));
        assert!(!transition(&last, RTCIceConnectionState::Checking));
        assert!(transition(&last, RTCIceConnectionState::Connected));
        // A revisited state after an intervening one is a real transition
        assert!(transition(&last, RTCIceConnectionState::Checking));
    }

    #[test]
    fn test_transport_event_display() {
        let event = TransportEvent::Ice(RTCIceConnectionState::Connected);
        assert_eq!(event.to_string(), "ice connected");
    }
}
