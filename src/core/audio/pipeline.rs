//! Bridges the local duplex audio device to the conversation transport.
//!
//! Capture side: a pump task forwards every captured frame, in order, as an
//! audio-append event into the outbound event queue. A capture failure is
//! fatal for the pipeline: it is reported upward and capture stops.
//!
//! Render side: inbound chunks are written through to the output device in
//! arrival order. A render failure is logged and playback of subsequent
//! chunks continues.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::events::ClientEvent;

use super::{AudioDevice, AudioFrame, CHANNELS, CaptureEvent, DeviceError, DeviceResult, SAMPLE_RATE};

/// Queue capacity between the device and the pump task.
const FRAME_BUFFER: usize = 64;

/// Binds an audio device to an outbound event queue for one conversation.
pub struct AudioPipeline {
    device: Arc<dyn AudioDevice>,
    outbound: mpsc::Sender<ClientEvent>,
    pump: Option<JoinHandle<()>>,
    rendered_ms: u64,
}

impl AudioPipeline {
    pub fn new(device: Arc<dyn AudioDevice>, outbound: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            device,
            outbound,
            pump: None,
            rendered_ms: 0,
        }
    }

    /// Start capture and the forwarding pump.
    ///
    /// Returns a receiver that yields the capture failure, if one occurs;
    /// the failure is fatal and capture is already stopped when it arrives.
    pub fn start_capture(&mut self) -> DeviceResult<mpsc::Receiver<DeviceError>> {
        let (sink_tx, mut sink_rx) = mpsc::channel(FRAME_BUFFER);
        let (failure_tx, failure_rx) = mpsc::channel(1);
        self.device.start_capture(sink_tx)?;

        let outbound = self.outbound.clone();
        let device = self.device.clone();
        self.pump = Some(tokio::spawn(async move {
            while let Some(event) = sink_rx.recv().await {
                match event {
                    CaptureEvent::Frame(frame) => {
                        if outbound
                            .send(ClientEvent::audio_append(&frame.samples))
                            .await
                            .is_err()
                        {
                            debug!("outbound event queue closed, capture pump ending");
                            break;
                        }
                    }
                    CaptureEvent::Failed(error) => {
                        device.stop_capture();
                        let _ = failure_tx.send(error).await;
                        break;
                    }
                }
            }
        }));

        Ok(failure_rx)
    }

    /// Stop capture and the forwarding pump. Idempotent.
    pub fn stop_capture(&mut self) {
        self.device.stop_capture();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    /// Render one inbound PCM16 chunk to the output device.
    ///
    /// Best-effort: a device failure is logged and does not affect later
    /// chunks.
    pub fn render(&mut self, pcm: Bytes) {
        let frame = AudioFrame {
            timestamp_ms: self.rendered_ms,
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            samples: pcm,
        };
        self.rendered_ms += frame.duration_ms();
        if let Err(e) = self.device.render(frame) {
            warn!("playback failed, continuing: {e}");
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop_capture();
    }
}
