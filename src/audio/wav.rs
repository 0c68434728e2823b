//! WAV clip encoding.
//!
//! The clip engine buffers raw PCM during capture and encodes it into an
//! in-memory WAV file for transport to the transcription service.

use std::io::Cursor;

use crate::defaults;
use crate::error::{HarkenError, Result};

/// Encode mono 16-bit PCM into a complete WAV file in memory.
pub fn encode_clip(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: defaults::CHANNELS,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| HarkenError::ClipEncode {
            message: format!("Failed to start WAV writer: {}", e),
        })?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| HarkenError::ClipEncode {
                message: format!("Failed to write sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| HarkenError::ClipEncode {
        message: format!("Failed to finalize WAV data: {}", e),
    })?;

    Ok(cursor.into_inner())
}

/// Simple linear interpolation resampling.
///
/// Only the hardware capture path converts rates, so this is compiled
/// alongside it.
#[cfg(feature = "cpal-audio")]
pub(crate) fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> (hound::WavSpec, Vec<i16>) {
        let reader = hound::WavReader::new(Cursor::new(bytes.to_vec())).unwrap();
        let spec = reader.spec();
        let samples = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        (spec, samples)
    }

    #[test]
    fn test_encode_clip_round_trips_samples() {
        let samples = vec![0i16, 1000, -1000, i16::MAX, i16::MIN, 42];
        let bytes = encode_clip(&samples, defaults::SAMPLE_RATE).unwrap();

        let (spec, decoded) = decode(&bytes);
        assert_eq!(decoded, samples);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    }

    #[test]
    fn test_encode_clip_produces_riff_header() {
        let bytes = encode_clip(&[0i16; 160], defaults::SAMPLE_RATE).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn test_encode_empty_clip_is_valid_wav() {
        // A capture stopped instantly produces a zero-sample clip; the
        // container must still parse.
        let bytes = encode_clip(&[], defaults::SAMPLE_RATE).unwrap();
        let (_, decoded) = decode(&bytes);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_encode_clip_size_tracks_sample_count() {
        let short = encode_clip(&[1i16; 160], defaults::SAMPLE_RATE).unwrap();
        let long = encode_clip(&[1i16; 16000], defaults::SAMPLE_RATE).unwrap();
        // 2 bytes per sample plus a fixed-size header
        assert_eq!(long.len() - short.len(), (16000 - 160) * 2);
    }

    #[cfg(feature = "cpal-audio")]
    #[test]
    fn test_resample_identity_same_rate() {
        let samples = vec![100i16, 200, 300, 400, 500];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[cfg(feature = "cpal-audio")]
    #[test]
    fn test_resample_upsample_interpolates() {
        let samples = vec![0i16, 1000, 2000];
        let resampled = resample(&samples, 8000, 16000);

        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[cfg(feature = "cpal-audio")]
    #[test]
    fn test_resample_downsample_halves_count() {
        let samples = vec![0i16; 3200];
        assert_eq!(resample(&samples, 16000, 8000).len(), 1600);
    }

    #[cfg(feature = "cpal-audio")]
    #[test]
    fn test_resample_preserves_signal_amplitude() {
        let samples = vec![1000i16; 100];
        let resampled = resample(&samples, 48000, 16000);
        assert!(resampled.iter().all(|&s| (999..=1001).contains(&s)));
    }

    #[cfg(feature = "cpal-audio")]
    #[test]
    fn test_resample_handles_edge_cases() {
        assert_eq!(resample(&[], 16000, 8000).len(), 0);

        let single = resample(&[100i16], 16000, 8000);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0], 100);
    }
}
