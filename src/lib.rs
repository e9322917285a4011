pub mod config;
pub mod core;

// Re-export commonly used items for convenience
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::audio::{
    AudioDevice, AudioFrame, AudioPipeline, CaptureEvent, CpalDevice, DeviceError,
};
pub use crate::core::conversation::{
    ConversationController, ConversationError, ConversationOptions, ConversationState,
    ConversationTransport, PeerTransport, SessionSignal,
};
pub use crate::core::credentials::{AuthError, Credential, CredentialBroker};
pub use crate::core::events::{ClientEvent, EventChannel, EventError, ServerEvent};
pub use crate::core::peer::{ConnectionMonitor, NegotiationError, SessionNegotiator, TransportEvent};
