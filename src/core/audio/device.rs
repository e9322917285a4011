//! cpal-backed duplex audio device.
//!
//! cpal streams are not `Send`, so each direction runs on a dedicated thread
//! that owns its stream and watches an atomic stop flag. Streams are built
//! as f32 (the most widely supported sample format) and converted to/from
//! the PCM16 wire format in the callbacks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    AudioDevice, AudioFrame, CHANNELS, CaptureEvent, DeviceError, DeviceResult, FRAME_SAMPLES,
    SAMPLE_RATE,
};

/// How long a device thread sleeps between stop-flag checks.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Playback ring cap. Write-through semantics: the ring only exists to hand
/// samples to the output callback, so anything beyond a few seconds of
/// backlog is dropped oldest-first.
const MAX_QUEUED_SAMPLES: usize = SAMPLE_RATE as usize * 5;

/// Default duplex device using the host's default input and output.
pub struct CpalDevice {
    capture_stop: Arc<AtomicBool>,
    capture_running: Arc<AtomicBool>,
    playback_stop: Arc<AtomicBool>,
    playback_running: Arc<AtomicBool>,
    playback_queue: Arc<Mutex<VecDeque<i16>>>,
}

impl CpalDevice {
    pub fn new() -> Self {
        Self {
            capture_stop: Arc::new(AtomicBool::new(false)),
            capture_running: Arc::new(AtomicBool::new(false)),
            playback_stop: Arc::new(AtomicBool::new(false)),
            playback_running: Arc::new(AtomicBool::new(false)),
            playback_queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn stream_config() -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        }
    }

    /// Start the playback thread if it is not already running.
    fn ensure_playback(&self) -> DeviceResult<()> {
        if self.playback_running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let stop = self.playback_stop.clone();
        let running = self.playback_running.clone();
        let queue = self.playback_queue.clone();
        let (ready_tx, ready_rx) = std_mpsc::channel::<DeviceResult<()>>();

        stop.store(false, Ordering::SeqCst);
        thread::spawn(move || {
            let build = || -> DeviceResult<cpal::Stream> {
                let host = cpal::default_host();
                let device = host
                    .default_output_device()
                    .ok_or(DeviceError::NoDevice("output"))?;
                debug!(device = ?device.name().ok(), "opening output stream");
                let callback_queue = queue.clone();
                let stream = device
                    .build_output_stream(
                        &Self::stream_config(),
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            let mut queue = callback_queue.lock();
                            for sample in data.iter_mut() {
                                *sample = match queue.pop_front() {
                                    Some(pcm) => pcm as f32 / i16::MAX as f32,
                                    None => 0.0,
                                };
                            }
                        },
                        |e| warn!("output stream error: {e}"),
                        None,
                    )
                    .map_err(|e| DeviceError::Configuration(e.to_string()))?;
                stream
                    .play()
                    .map_err(|e| DeviceError::Stream(e.to_string()))?;
                Ok(stream)
            };

            match build() {
                Ok(stream) => {
                    running.store(true, Ordering::SeqCst);
                    let _ = ready_tx.send(Ok(()));
                    while !stop.load(Ordering::SeqCst) {
                        thread::sleep(STOP_POLL_INTERVAL);
                    }
                    drop(stream);
                    running.store(false, Ordering::SeqCst);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        ready_rx
            .recv()
            .unwrap_or_else(|_| Err(DeviceError::Stream("playback thread died".to_string())))
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.capture_stop.store(true, Ordering::SeqCst);
        self.playback_stop.store(true, Ordering::SeqCst);
    }
}

impl AudioDevice for CpalDevice {
    fn start_capture(&self, sink: mpsc::Sender<CaptureEvent>) -> DeviceResult<()> {
        if self.capture_running.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::Stream("capture already running".to_string()));
        }

        let stop = self.capture_stop.clone();
        let running = self.capture_running.clone();
        let (ready_tx, ready_rx) = std_mpsc::channel::<DeviceResult<()>>();

        stop.store(false, Ordering::SeqCst);
        thread::spawn(move || {
            let callback_sink = sink.clone();
            let error_sink = sink;
            let error_stop = stop.clone();

            let build = || -> DeviceResult<cpal::Stream> {
                let host = cpal::default_host();
                let device = host
                    .default_input_device()
                    .ok_or(DeviceError::NoDevice("input"))?;
                info!(device = ?device.name().ok(), "opening input stream");

                // Accumulates samples across callbacks so frames have a
                // fixed size regardless of the hardware buffer period.
                let mut pending: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES * 2);
                let mut samples_sent: u64 = 0;

                let stream = device
                    .build_input_stream(
                        &Self::stream_config(),
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            pending.extend(
                                data.iter()
                                    .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                            );
                            while pending.len() >= FRAME_SAMPLES {
                                let mut bytes = Vec::with_capacity(FRAME_SAMPLES * 2);
                                for sample in pending.drain(..FRAME_SAMPLES) {
                                    bytes.extend_from_slice(&sample.to_le_bytes());
                                }
                                let frame = AudioFrame {
                                    samples: Bytes::from(bytes),
                                    timestamp_ms: samples_sent * 1000 / SAMPLE_RATE as u64,
                                    sample_rate: SAMPLE_RATE,
                                    channels: CHANNELS,
                                };
                                samples_sent += FRAME_SAMPLES as u64;
                                if callback_sink.try_send(CaptureEvent::Frame(frame)).is_err() {
                                    warn!("capture queue full, frame dropped");
                                }
                            }
                        },
                        move |e| {
                            let _ = error_sink.try_send(CaptureEvent::Failed(DeviceError::Stream(
                                e.to_string(),
                            )));
                            error_stop.store(true, Ordering::SeqCst);
                        },
                        None,
                    )
                    .map_err(|e| DeviceError::Configuration(e.to_string()))?;
                stream
                    .play()
                    .map_err(|e| DeviceError::Stream(e.to_string()))?;
                Ok(stream)
            };

            match build() {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    while !stop.load(Ordering::SeqCst) {
                        thread::sleep(STOP_POLL_INTERVAL);
                    }
                    drop(stream);
                    running.store(false, Ordering::SeqCst);
                    debug!("capture stopped");
                }
                Err(e) => {
                    running.store(false, Ordering::SeqCst);
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        ready_rx
            .recv()
            .unwrap_or_else(|_| Err(DeviceError::Stream("capture thread died".to_string())))
    }

    fn stop_capture(&self) {
        self.capture_stop.store(true, Ordering::SeqCst);
    }

    fn render(&self, frame: AudioFrame) -> DeviceResult<()> {
        self.ensure_playback()?;

        let mut queue = self.playback_queue.lock();
        for chunk in frame.samples.chunks_exact(2) {
            queue.push_back(i16::from_le_bytes([chunk[0], chunk[1]]));
        }
        if queue.len() > MAX_QUEUED_SAMPLES {
            let excess = queue.len() - MAX_QUEUED_SAMPLES;
            queue.drain(..excess);
            warn!(dropped_samples = excess, "playback backlog trimmed");
        }
        Ok(())
    }
}
