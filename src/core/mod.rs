pub mod audio;
pub mod conversation;
pub mod credentials;
pub mod events;
pub mod peer;

// Re-export commonly used types for convenience
pub use audio::{AudioDevice, AudioFrame, AudioPipeline, CaptureEvent, DeviceError, DeviceResult};
pub use conversation::{
    ConversationController, ConversationError, ConversationOptions, ConversationResult,
    ConversationState, ConversationTransport, PeerTransport, SessionSignal,
};
pub use credentials::{AuthError, AuthResult, Credential, CredentialBroker};
pub use events::{ClientEvent, EventChannel, EventError, EventResult, ServerEvent};
pub use peer::{
    ConnectionMonitor, NegotiationError, NegotiationResult, SessionNegotiator, TransportEvent,
};
