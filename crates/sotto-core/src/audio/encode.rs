//! Deterministic finalize pipeline: captured samples to an encoded WAV clip.
//!
//! Every step is a pure function of the input sample array, so identical
//! input always yields byte-identical output.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

use super::EncodedClip;
use crate::error::{Error, Result};
use crate::resample::{self, TARGET_SAMPLE_RATE};

/// Finalize a capture: resample to 16 kHz, peak-normalize, quantize to
/// 16-bit PCM and wrap in a WAV container with a base64 transport form.
pub fn finalize_clip(samples: &[f32], source_rate: u32) -> Result<EncodedClip> {
    let samples = resample::to_target_rate(samples, source_rate)?;
    let samples = normalize_peak(samples);
    let pcm = quantize_i16(&samples);
    let wav = encode_wav(&pcm)?;
    let base64 = BASE64.encode(&wav);
    Ok(EncodedClip {
        samples: pcm.len(),
        duration_secs: pcm.len() as f64 / TARGET_SAMPLE_RATE as f64,
        wav,
        base64,
    })
}

/// Scale the whole clip by 1/peak when the peak exceeds full scale.
/// Quiet audio is never boosted.
fn normalize_peak(mut samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak > 1.0 {
        let scale = 1.0 / peak;
        for s in &mut samples {
            *s *= scale;
        }
    }
    samples
}

/// Quantize to signed 16-bit PCM. Negative samples scale by 32768 and
/// positive by 32767 so full scale maps to the exact i16 range without
/// overflow.
fn quantize_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let clamped = s.clamp(-1.0, 1.0);
            if clamped < 0.0 {
                (clamped * 32768.0).max(-32768.0) as i16
            } else {
                (clamped * 32767.0) as i16
            }
        })
        .collect()
}

fn encode_wav(pcm: &[i16]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)
        .map_err(|e| Error::EncodeFailure(format!("WAV writer: {e}")))?;
    for &sample in pcm {
        writer
            .write_sample(sample)
            .map_err(|e| Error::EncodeFailure(format!("WAV write: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::EncodeFailure(format!("WAV finalize: {e}")))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    fn pcm_samples(wav: &[u8]) -> Vec<i16> {
        let reader = hound::WavReader::new(Cursor::new(wav.to_vec())).unwrap();
        reader.into_samples::<i16>().map(|s| s.unwrap()).collect()
    }

    #[test]
    fn identical_input_yields_byte_identical_output() {
        let samples: Vec<f32> = (0..4_000).map(|i| ((i % 100) as f32 / 50.0) - 1.0).collect();
        let a = finalize_clip(&samples, 44_100).unwrap();
        let b = finalize_clip(&samples, 44_100).unwrap();
        assert_eq!(a.wav, b.wav);
        assert_eq!(a.base64, b.base64);
    }

    #[test]
    fn wav_header_declares_mono_16bit_16khz() {
        let clip = finalize_clip(&[0.1; 1600], TARGET_SAMPLE_RATE).unwrap();
        let wav = &clip.wav;
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(read_u16_le(wav, 20), 1, "PCM format tag");
        assert_eq!(read_u16_le(wav, 22), 1, "mono");
        assert_eq!(read_u32_le(wav, 24), 16_000, "sample rate");
        assert_eq!(read_u16_le(wav, 34), 16, "bits per sample");
    }

    #[test]
    fn quiet_audio_is_not_boosted() {
        // Peak 0.5 must quantize unscaled
        let clip = finalize_clip(&[0.5, -0.5, 0.25], TARGET_SAMPLE_RATE).unwrap();
        let pcm = pcm_samples(&clip.wav);
        assert_eq!(pcm[0], (0.5f32 * 32767.0) as i16);
        assert_eq!(pcm[1], (-0.5f32 * 32768.0) as i16);
        assert_eq!(pcm[2], (0.25f32 * 32767.0) as i16);
    }

    #[test]
    fn loud_audio_scales_to_exact_full_range() {
        // Peak 2.0 scales by 0.5: the loudest sample exactly fills the range
        let clip = finalize_clip(&[2.0, -2.0, 1.0], TARGET_SAMPLE_RATE).unwrap();
        let pcm = pcm_samples(&clip.wav);
        assert_eq!(pcm[0], 32767);
        assert_eq!(pcm[1], -32768);
        assert_eq!(pcm[2], (0.5f32 * 32767.0) as i16);
    }

    #[test]
    fn full_scale_input_never_overflows() {
        let clip = finalize_clip(&[1.0, -1.0], TARGET_SAMPLE_RATE).unwrap();
        let pcm = pcm_samples(&clip.wav);
        assert_eq!(pcm, vec![32767, -32768]);
    }

    #[test]
    fn duration_matches_sample_count() {
        let clip = finalize_clip(&vec![0.0; 16_000], TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(clip.samples, 16_000);
        assert!((clip.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_capture_yields_empty_clip() {
        let clip = finalize_clip(&[], 48_000).unwrap();
        assert!(clip.is_empty());
        assert_eq!(clip.duration_secs, 0.0);
        // Still a valid WAV container
        assert_eq!(&clip.wav[0..4], b"RIFF");
    }

    #[test]
    fn base64_decodes_back_to_wav_bytes() {
        let clip = finalize_clip(&[0.3; 320], TARGET_SAMPLE_RATE).unwrap();
        let decoded = BASE64.decode(&clip.base64).unwrap();
        assert_eq!(decoded, clip.wav);
    }
}
