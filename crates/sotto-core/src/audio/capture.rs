//! Microphone capture engine.
//!
//! The cpal input stream lives on a dedicated capture thread that owns the
//! device for the lifetime of one capture. The controller talks to it only
//! through channels: a stop command in, a ready/error handshake out, and a
//! shared sample buffer appended from the audio callback. Frames arrive at
//! the device's native rate and channel count and are downmixed to mono in
//! the callback; resampling happens once at stop.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{encode, EncodedClip};
use crate::backend::Transcript;
use crate::error::{Error, Result};

/// Result of stopping a capture: either a locally encoded clip that still
/// needs transcription, or a transcript when the backend owned the capture.
#[derive(Debug)]
pub enum StopOutcome {
    Clip(EncodedClip),
    Transcript(Transcript),
}

/// Audio capture engine driven by the session controller.
///
/// Implementations guarantee at most one open capture: a second `start`
/// is rejected outright, never queued.
#[async_trait]
pub trait CaptureEngine: Send + Sync + 'static {
    /// Acquire the device and begin buffering frames.
    async fn start(&self, device: Option<String>) -> Result<()>;

    /// Release the device and finalize the capture.
    async fn stop(&self) -> Result<StopOutcome>;

    /// Release the device and discard all buffered audio. Idempotent.
    async fn cancel(&self) -> Result<()>;
}

struct ActiveCapture {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
}

/// Capture engine over the default cpal host.
pub struct MicCapture {
    inner: tokio::sync::Mutex<Option<ActiveCapture>>,
}

impl MicCapture {
    pub fn new() -> Self {
        Self {
            inner: tokio::sync::Mutex::new(None),
        }
    }

    async fn teardown(active: ActiveCapture) -> (Vec<f32>, u32) {
        let ActiveCapture {
            stop_tx,
            thread,
            samples,
            sample_rate,
        } = active;
        let buffered = tokio::task::spawn_blocking(move || {
            let _ = stop_tx.send(());
            let _ = thread.join();
            let mut guard = samples.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *guard)
        })
        .await
        .unwrap_or_default();
        (buffered, sample_rate)
    }
}

impl Default for MicCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureEngine for MicCapture {
    async fn start(&self, device: Option<String>) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Err(Error::AlreadyCapturing);
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let shared = Arc::clone(&samples);
        let thread = std::thread::spawn(move || {
            run_capture(device, shared, stop_rx, ready_tx);
        });

        // The thread reports the device rate once the stream is playing,
        // or a classified error if acquisition failed.
        let sample_rate = match ready_rx.await {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = tokio::task::spawn_blocking(move || thread.join()).await;
                return Err(e);
            }
            Err(_) => {
                return Err(Error::DeviceUnavailable(
                    "capture thread exited during startup".into(),
                ));
            }
        };

        *guard = Some(ActiveCapture {
            stop_tx,
            thread,
            samples,
            sample_rate,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<StopOutcome> {
        let active = {
            let mut guard = self.inner.lock().await;
            guard.take().ok_or(Error::NotCapturing)?
        };
        let (buffered, sample_rate) = Self::teardown(active).await;
        let clip = tokio::task::spawn_blocking(move || encode::finalize_clip(&buffered, sample_rate))
            .await
            .map_err(|e| Error::EncodeFailure(format!("encode task failed: {e}")))??;
        Ok(StopOutcome::Clip(clip))
    }

    async fn cancel(&self) -> Result<()> {
        let active = {
            let mut guard = self.inner.lock().await;
            guard.take()
        };
        if let Some(active) = active {
            let _ = Self::teardown(active).await;
        }
        Ok(())
    }
}

/// Capture thread body: build the stream, report readiness, then park until
/// told to stop. Dropping the stream releases the device.
fn run_capture(
    device_name: Option<String>,
    samples: Arc<Mutex<Vec<f32>>>,
    stop_rx: mpsc::Receiver<()>,
    ready_tx: tokio::sync::oneshot::Sender<Result<u32>>,
) {
    let (stream, sample_rate) = match open_stream(device_name.as_deref(), samples) {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(sample_rate));

    loop {
        match stop_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => continue,
        }
    }
    drop(stream);
}

fn open_stream(
    device_name: Option<&str>,
    samples: Arc<Mutex<Vec<f32>>>,
) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => find_device(&host, name)?,
        None => host.default_input_device().ok_or_else(|| {
            Error::DeviceUnavailable("no default input device available".into())
        })?,
    };

    let config = device
        .default_input_config()
        .map_err(|e| classify_device_error(&e.to_string()))?;
    let sample_rate = config.sample_rate().0;
    let sample_format = config.sample_format();
    let stream_config: StreamConfig = config.into();

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, samples),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, samples),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, samples),
        other => Err(Error::DeviceUnavailable(format!(
            "unsupported sample format: {other:?}"
        ))),
    }?;

    Ok((stream, sample_rate))
}

fn find_device(host: &cpal::Host, name: &str) -> Result<Device> {
    let devices = host
        .input_devices()
        .map_err(|e| classify_device_error(&e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(Error::DeviceUnavailable(format!(
        "input device '{name}' not found"
    )))
}

/// Build the input stream for a concrete sample format, downmixing each
/// callback buffer to mono before appending to the shared buffer.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
) -> Result<Stream>
where
    T: cpal::Sample + cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;

    // Stream errors (common with USB audio on Linux) are non-fatal;
    // log the first and then every thousandth.
    let error_count = Arc::new(AtomicU64::new(0));
    let err_fn = move |err: cpal::StreamError| {
        let count = error_count.fetch_add(1, Ordering::Relaxed);
        if count == 0 {
            tracing::warn!("audio stream error (non-fatal): {err}");
        } else if count % 1000 == 0 {
            tracing::warn!("audio stream: {count} non-fatal errors so far");
        }
    };

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut mono = Vec::with_capacity(data.len() / channels.max(1));
                for frame in data.chunks(channels.max(1)) {
                    let sum: f32 = frame
                        .iter()
                        .map(|&s| <f32 as cpal::Sample>::from_sample(s))
                        .sum();
                    mono.push(sum / channels.max(1) as f32);
                }
                let mut buffer = samples.lock().unwrap_or_else(|p| p.into_inner());
                buffer.extend_from_slice(&mono);
            },
            err_fn,
            None,
        )
        .map_err(|e| classify_device_error(&e.to_string()))?;

    Ok(stream)
}

/// Distinguish a permission problem from a generally unavailable device.
fn classify_device_error(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        Error::PermissionDenied
    } else {
        Error::DeviceUnavailable(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_classified() {
        assert!(matches!(
            classify_device_error("Access denied by the OS"),
            Error::PermissionDenied
        ));
        assert!(matches!(
            classify_device_error("microphone permission not granted"),
            Error::PermissionDenied
        ));
        assert!(matches!(
            classify_device_error("device disconnected"),
            Error::DeviceUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn stop_without_start_is_an_error() {
        let capture = MicCapture::new();
        assert!(matches!(capture.stop().await, Err(Error::NotCapturing)));
    }

    #[tokio::test]
    async fn cancel_without_start_is_a_no_op() {
        let capture = MicCapture::new();
        assert!(capture.cancel().await.is_ok());
    }
}
