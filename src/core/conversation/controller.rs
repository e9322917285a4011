//! The conversation state machine.
//!
//! One controller instance owns the credential broker, the transport, and
//! the audio device for the lifetime of the process, and at most one
//! conversation is live at a time. All inbound control messages and pipeline
//! signals are processed one at a time, in arrival order, by the single
//! [`next_signal`](ConversationController::next_signal) /
//! [`handle_signal`](ConversationController::handle_signal) loop.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::core::audio::{AudioDevice, AudioPipeline, DeviceError};
use crate::core::credentials::{AuthError, CredentialBroker};
use crate::core::events::{ClientEvent, EventError, ServerEvent};
use crate::core::peer::NegotiationError;

use super::ConversationState;
use super::transport::ConversationTransport;

/// Queue capacity for outbound control events (audio appends dominate).
const OUTBOUND_BUFFER: usize = 256;

/// Errors surfaced by conversation operations.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// The operation is not allowed in the current state. Reported to the
    /// caller rather than silently ignored; state is left unchanged.
    #[error("{operation} not allowed while {state}")]
    InvalidState {
        /// The rejected operation
        operation: &'static str,
        /// State at the time of the call
        state: ConversationState,
    },

    /// Credential acquisition failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Session negotiation failed
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Control channel failure
    #[error(transparent)]
    Event(#[from] EventError),

    /// Audio device failure
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The transport reported established but produced no event stream
    #[error("transport produced no event stream")]
    MissingEventStream,
}

/// Result type for conversation operations.
pub type ConversationResult<T> = Result<T, ConversationError>;

/// What the conversation wants to say or start.
#[derive(Debug, Clone)]
pub struct ConversationOptions {
    /// Model to converse with
    pub model: String,
    /// Voice for synthesized audio
    pub voice: String,
    /// Response modalities for the start directive
    pub modalities: Vec<String>,
    /// System instructions for the start directive
    pub instructions: Option<String>,
}

/// One unit of work for the controller's processing loop.
#[derive(Debug)]
pub enum SessionSignal {
    /// Inbound control event, in arrival order
    Server(ServerEvent),
    /// Outbound control event produced by the audio pipeline
    Outbound(ClientEvent),
    /// The capture side failed; fatal for the conversation
    CaptureFailed(DeviceError),
    /// The inbound event stream ended (remote closed)
    Closed,
}

/// Top-level state machine sequencing negotiation, audio, and control
/// events for a single conversation at a time.
pub struct ConversationController {
    state: ConversationState,
    broker: CredentialBroker,
    transport: Box<dyn ConversationTransport>,
    device: Arc<dyn AudioDevice>,
    options: ConversationOptions,

    // Live-conversation wiring; all None while Idle.
    pipeline: Option<AudioPipeline>,
    events: Option<mpsc::Receiver<ServerEvent>>,
    outbound: Option<mpsc::Receiver<ClientEvent>>,
    capture_failures: Option<mpsc::Receiver<DeviceError>>,
}

impl ConversationController {
    pub fn new(
        broker: CredentialBroker,
        transport: Box<dyn ConversationTransport>,
        device: Arc<dyn AudioDevice>,
        options: ConversationOptions,
    ) -> Self {
        Self {
            state: ConversationState::Idle,
            broker,
            transport,
            device,
            options,
            pipeline: None,
            events: None,
            outbound: None,
            capture_failures: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Begin a conversation: acquire a credential, negotiate the session,
    /// wire the control channel and audio pipeline, send the start
    /// directive, and start capture.
    ///
    /// Only valid while Idle. On any step failure every partially wired
    /// resource is released, the state returns to Idle, and the error is
    /// surfaced; nothing is retried.
    pub async fn begin(&mut self) -> ConversationResult<()> {
        if self.state != ConversationState::Idle {
            return Err(ConversationError::InvalidState {
                operation: "begin",
                state: self.state,
            });
        }

        self.state = ConversationState::Negotiating;
        info!(model = %self.options.model, voice = %self.options.voice, "starting conversation");

        match self.wire_session().await {
            Ok(()) => {
                self.state = ConversationState::Active;
                info!("conversation active");
                Ok(())
            }
            Err(e) => {
                self.teardown().await;
                self.state = ConversationState::Idle;
                Err(e)
            }
        }
    }

    async fn wire_session(&mut self) -> ConversationResult<()> {
        let credential = self
            .broker
            .acquire(&self.options.model, &self.options.voice)
            .await?;

        self.transport.establish(credential).await?;
        self.events = Some(
            self.transport
                .take_events()
                .ok_or(ConversationError::MissingEventStream)?,
        );

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.outbound = Some(outbound_rx);
        let mut pipeline = AudioPipeline::new(self.device.clone(), outbound_tx);

        self.transport
            .send_event(&ClientEvent::start_exchange(
                self.options.modalities.clone(),
                self.options.instructions.clone(),
            ))
            .await?;

        self.capture_failures = Some(pipeline.start_capture()?);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// End the conversation: send the stop directive, stop capture, and
    /// release the peer connection. A no-op while Idle. Safe to call at any
    /// point after `begin()` has started.
    pub async fn end(&mut self) -> ConversationResult<()> {
        match self.state {
            ConversationState::Idle => {
                debug!("end() while idle is a no-op");
                return Ok(());
            }
            ConversationState::Terminating => return Ok(()),
            _ => {}
        }

        let was_active = self.state == ConversationState::Active;
        self.state = ConversationState::Terminating;
        info!("ending conversation");

        if was_active
            && let Err(e) = self.transport.send_event(&ClientEvent::ResponseCancel).await
        {
            warn!("stop directive not delivered: {e}");
        }

        self.teardown().await;
        self.state = ConversationState::Idle;
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop_capture();
        }
        self.capture_failures = None;
        self.outbound = None;
        self.events = None;
        self.transport.close().await;
    }

    /// Wait for the next unit of work. Pends forever while no conversation
    /// is wired, so it can sit in a `select!` alongside user input.
    ///
    /// Cancel-safe: all branches are queue receives.
    pub async fn next_signal(&mut self) -> SessionSignal {
        let (Some(events), Some(outbound), Some(failures)) = (
            self.events.as_mut(),
            self.outbound.as_mut(),
            self.capture_failures.as_mut(),
        ) else {
            return std::future::pending().await;
        };

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => SessionSignal::Server(event),
                None => SessionSignal::Closed,
            },
            Some(event) = outbound.recv() => SessionSignal::Outbound(event),
            Some(error) = failures.recv() => SessionSignal::CaptureFailed(error),
        }
    }

    /// Process one signal. Inbound events are handled strictly one at a
    /// time, preserving arrival order.
    pub async fn handle_signal(&mut self, signal: SessionSignal) -> ConversationResult<()> {
        match signal {
            SessionSignal::Outbound(event) => {
                self.transport.send_event(&event).await?;
                Ok(())
            }
            SessionSignal::Server(event) => {
                self.handle_server_event(event);
                Ok(())
            }
            SessionSignal::CaptureFailed(error) => {
                error!("capture failed: {error}");
                self.end().await?;
                Err(ConversationError::Device(error))
            }
            SessionSignal::Closed => {
                info!("control channel closed by remote");
                self.end().await
            }
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::AudioDelta { delta, .. } => match ServerEvent::decode_audio_delta(&delta)
            {
                Ok(pcm) => {
                    if let Some(pipeline) = self.pipeline.as_mut() {
                        pipeline.render(Bytes::from(pcm));
                    }
                }
                Err(e) => warn!("audio chunk with invalid payload dropped: {e}"),
            },
            ServerEvent::AudioDone { .. } => trace!("audio item complete"),
            ServerEvent::AudioTranscriptDelta { delta } => trace!(%delta, "transcript delta"),
            ServerEvent::AudioTranscriptDone { transcript } => {
                info!(%transcript, "assistant said");
            }
            ServerEvent::SessionCreated { session } => {
                info!(session_id = %session.id, "session created");
            }
            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                debug!(audio_start_ms, "speech detected");
            }
            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                debug!(audio_end_ms, "speech ended");
            }
            ServerEvent::ResponseDone => debug!("exchange complete"),
            ServerEvent::Error { error } => {
                error!(
                    error_type = ?error.error_type,
                    code = ?error.code,
                    "endpoint error: {}",
                    error.message
                );
            }
            ServerEvent::Unknown { event_type, .. } => {
                debug!(%event_type, "ignoring unrecognized event");
            }
        }
    }
}
