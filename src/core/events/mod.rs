//! Control-channel event protocol.
//!
//! Structured JSON events travel over the peer connection's data channel in
//! both directions. `messages` defines the wire types, `channel` binds them
//! to an open data channel with ordered delivery.

mod channel;
mod messages;

use thiserror::Error;

pub use channel::EventChannel;
pub use messages::{ApiError, ClientEvent, ResponseConfig, ServerEvent, SessionInfo};

/// Errors that can occur on the control channel.
#[derive(Debug, Error)]
pub enum EventError {
    /// Send attempted before the data channel reported open. This is an
    /// ordering bug in the caller, not a transient condition; events are
    /// never queued for later delivery.
    #[error("control channel not ready")]
    ChannelNotReady,

    /// Failed to encode an outbound event
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// Failed to decode an inbound message
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),

    /// Data channel transport failure
    #[error("data channel send failed: {0}")]
    Transport(String),
}

/// Result type for control-channel operations.
pub type EventResult<T> = Result<T, EventError>;
