//! Offline resampling to the fixed 16 kHz transcription rate.
//!
//! Resampling runs once at capture stop, never in the audio callback.
//! The method is rubato's band-limited FFT resampler, processed in fixed
//! chunks with a zero-padded tail; the output is trimmed to the rounded
//! target length so clip duration is preserved within one sample.

use rubato::{FftFixedIn, Resampler};

use crate::error::{Error, Result};

/// Sample rate expected by the transcription backend.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

const CHUNK_FRAMES: usize = 1024;

/// Resample mono samples from `source_rate` to [`TARGET_SAMPLE_RATE`].
///
/// Returns the input unchanged when it is already at the target rate.
pub fn to_target_rate(samples: &[f32], source_rate: u32) -> Result<Vec<f32>> {
    if source_rate == TARGET_SAMPLE_RATE || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if source_rate == 0 {
        return Err(Error::EncodeFailure("source sample rate is zero".into()));
    }

    // Duration-preserving output length, rounded to the nearest sample
    let expected_len = ((samples.len() as u64 * TARGET_SAMPLE_RATE as u64
        + source_rate as u64 / 2)
        / source_rate as u64) as usize;

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        TARGET_SAMPLE_RATE as usize,
        CHUNK_FRAMES,
        2,
        1,
    )
    .map_err(|e| Error::EncodeFailure(format!("failed to create resampler: {e}")))?;

    let chunk_size = resampler.input_frames_max();
    let mut output = Vec::with_capacity(expected_len);

    for chunk in samples.chunks(chunk_size) {
        let mut padded = chunk.to_vec();
        if padded.len() < chunk_size {
            padded.resize(chunk_size, 0.0);
        }
        let result = resampler
            .process(&[padded], None)
            .map_err(|e| Error::EncodeFailure(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // The tail chunk was zero-padded; trim (or zero-fill) to the exact length
    output.resize(expected_len, 0.0);
    Ok(output)
}

/// Downmix interleaved multichannel samples to mono by averaging each frame.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
