//! Local audio capture and playback.
//!
//! The conversation core treats the sound hardware as a black-box duplex
//! device behind the [`AudioDevice`] trait: capture yields PCM16 frames at a
//! fixed rate, render consumes them write-through. `device` is the
//! cpal-backed implementation; `pipeline` bridges a device to the control
//! channel.

mod device;
pub mod pipeline;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

pub use device::CpalDevice;
pub use pipeline::AudioPipeline;

/// Sample rate used on both the capture and render paths (PCM16 mono).
pub const SAMPLE_RATE: u32 = 24_000;

/// Channel count used on both paths.
pub const CHANNELS: u16 = 1;

/// Samples per captured frame (20 ms at 24 kHz).
pub const FRAME_SAMPLES: usize = 480;

/// Errors reported by the audio device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No usable device of the given direction
    #[error("no {0} device available")]
    NoDevice(&'static str),

    /// The device rejected the requested stream configuration
    #[error("unsupported stream configuration: {0}")]
    Configuration(String),

    /// The running stream failed
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A unit of raw audio: PCM16LE samples plus capture/render metadata.
///
/// Frames are transient; they are handed off to the transport or the output
/// device and never retained.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM 16-bit signed little-endian samples
    pub samples: Bytes,
    /// Milliseconds since the stream started
    pub timestamp_ms: u64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl AudioFrame {
    /// Duration covered by this frame in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        let samples = (self.samples.len() / 2) as u64 / self.channels.max(1) as u64;
        samples * 1000 / self.sample_rate.max(1) as u64
    }
}

/// Events produced by the capture side of a device.
#[derive(Debug)]
pub enum CaptureEvent {
    /// A captured frame, in order
    Frame(AudioFrame),
    /// The capture stream failed; no further frames follow
    Failed(DeviceError),
}

/// Seam between the conversation core and the sound hardware.
///
/// Implementations must deliver captured frames in order and render frames
/// write-through, with no buffering beyond what the hardware hand-off needs.
pub trait AudioDevice: Send + Sync {
    /// Start capturing into `sink`. A read failure emits a single
    /// [`CaptureEvent::Failed`] and stops capture.
    fn start_capture(&self, sink: mpsc::Sender<CaptureEvent>) -> DeviceResult<()>;

    /// Stop capturing. Idempotent.
    fn stop_capture(&self);

    /// Render one frame to the output device.
    fn render(&self, frame: AudioFrame) -> DeviceResult<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame {
            samples: Bytes::from(vec![0u8; FRAME_SAMPLES * 2]),
            timestamp_ms: 0,
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
        };
        assert_eq!(frame.duration_ms(), 20);
    }
}
