//! Audio capture and clip encoding.
//!
//! The capture engine owns the microphone for the lifetime of one capture and
//! buffers raw frames at the device's native rate. Finalizing a capture runs
//! the deterministic encode pipeline in [`encode`], producing an
//! [`EncodedClip`] ready for cross-process handoff.

mod capture;
mod devices;
mod encode;

pub use capture::{CaptureEngine, MicCapture, StopOutcome};
pub use devices::{list_input_devices, InputDeviceInfo};
pub use encode::finalize_clip;

/// Finalized recording: a WAV container (mono, 16-bit, 16 kHz) plus its
/// transport-safe base64 form. Produced once per capture and consumed
/// exactly once downstream, hence not `Clone`.
#[derive(Debug)]
pub struct EncodedClip {
    /// WAV container bytes
    pub wav: Vec<u8>,
    /// Base64 (standard alphabet) encoding of `wav` for cross-process handoff
    pub base64: String,
    /// Number of 16 kHz PCM samples in the clip
    pub samples: usize,
    pub duration_secs: f64,
}

impl EncodedClip {
    /// True when the capture produced no audio frames at all.
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}
