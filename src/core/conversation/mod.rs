//! Conversation lifecycle: the state machine that sequences credential
//! acquisition, session negotiation, control events, and audio.

mod controller;
mod transport;

use std::fmt;

pub use controller::{
    ConversationController, ConversationError, ConversationOptions, ConversationResult,
    SessionSignal,
};
pub use transport::{ConversationTransport, PeerTransport};

/// Lifecycle state of the (single) conversation.
///
/// Idle is the initial and terminal state; transitions happen only through
/// [`ConversationController`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// No conversation; nothing is wired
    #[default]
    Idle,
    /// Credential acquisition and session negotiation in progress
    Negotiating,
    /// Capture running, events flowing
    Active,
    /// Teardown in progress
    Terminating,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "idle"),
            ConversationState::Negotiating => write!(f, "negotiating"),
            ConversationState::Active => write!(f, "active"),
            ConversationState::Terminating => write!(f, "terminating"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConversationState::Idle.to_string(), "idle");
        assert_eq!(ConversationState::Active.to_string(), "active");
    }

    #[test]
    fn test_initial_state_is_idle() {
        assert_eq!(ConversationState::default(), ConversationState::Idle);
    }
}
