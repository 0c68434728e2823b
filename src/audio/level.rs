//! Audio level frames and the decibel conversion used for endpointing.
//!
//! A level frame is a snapshot of normalized amplitude bins taken from the
//! live capture stream. Frames are sampled on a fixed cadence and reduced to
//! a single dB figure that the endpoint detector thresholds against.

use crate::defaults;

/// One snapshot of the capture stream's amplitude spectrum.
///
/// Bins are normalized to 0..=255, matching an analyser window of
/// [`defaults::LEVEL_BINS`] bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelFrame {
    /// Normalized amplitude per bin (0 = silent, 255 = full scale).
    pub bins: Vec<u8>,
}

impl LevelFrame {
    /// Creates a frame from raw bins.
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    /// A fully silent frame.
    pub fn silent() -> Self {
        Self {
            bins: vec![0; defaults::LEVEL_BINS],
        }
    }

    /// Build a frame from 16-bit PCM samples.
    ///
    /// Samples are bucketed into [`defaults::LEVEL_BINS`] bins; each bin is
    /// the mean absolute amplitude of its bucket, scaled to 0..=255.
    pub fn from_samples(samples: &[i16]) -> Self {
        if samples.is_empty() {
            return Self::silent();
        }

        let bin_count = defaults::LEVEL_BINS.min(samples.len());
        let bucket = samples.len().div_ceil(bin_count);
        let bins = samples
            .chunks(bucket)
            .map(|chunk| {
                let sum: u64 = chunk.iter().map(|&s| (s as i32).unsigned_abs() as u64).sum();
                let mean = sum / chunk.len() as u64;
                // i16 full scale (32767) maps to 255
                (mean >> 7).min(255) as u8
            })
            .collect();

        Self { bins }
    }

    /// Mean amplitude across all bins.
    pub fn average(&self) -> f32 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.bins.iter().map(|&b| b as u32).sum();
        sum as f32 / self.bins.len() as f32
    }

    /// Level in decibels relative to full scale: `20·log10(avg/255)`.
    ///
    /// A zero-amplitude (or empty) frame reports [`defaults::DB_FLOOR`]
    /// instead of negative infinity.
    pub fn level_db(&self) -> f32 {
        let average = self.average();
        if average > 0.0 {
            let db = 20.0 * (average / 255.0).log10();
            db.max(defaults::DB_FLOOR)
        } else {
            defaults::DB_FLOOR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_frame_reports_floor() {
        assert_eq!(LevelFrame::silent().level_db(), defaults::DB_FLOOR);
    }

    #[test]
    fn test_empty_frame_reports_floor() {
        let frame = LevelFrame::new(Vec::new());
        assert_eq!(frame.level_db(), defaults::DB_FLOOR);
    }

    #[test]
    fn test_full_scale_is_zero_db() {
        let frame = LevelFrame::new(vec![255; defaults::LEVEL_BINS]);
        assert!(frame.level_db().abs() < 0.001);
    }

    #[test]
    fn test_known_level() {
        // avg 50/255 → 20·log10(0.196) ≈ -14.15 dB
        let frame = LevelFrame::new(vec![50; defaults::LEVEL_BINS]);
        let db = frame.level_db();
        assert!((db - (-14.15)).abs() < 0.01, "got {}", db);
    }

    #[test]
    fn test_quantization_near_default_threshold() {
        // avg 1 sits just below -45 dB, avg 2 just above; the detector's
        // default threshold falls between the two smallest nonzero levels.
        let quiet = LevelFrame::new(vec![1; defaults::LEVEL_BINS]);
        let faint = LevelFrame::new(vec![2; defaults::LEVEL_BINS]);
        assert!(quiet.level_db() < defaults::SILENCE_THRESHOLD_DB);
        assert!(faint.level_db() > defaults::SILENCE_THRESHOLD_DB);
    }

    #[test]
    fn test_louder_frames_report_higher_levels() {
        let soft = LevelFrame::new(vec![10; 32]);
        let loud = LevelFrame::new(vec![200; 32]);
        assert!(loud.level_db() > soft.level_db());
    }

    #[test]
    fn test_from_samples_silence() {
        let frame = LevelFrame::from_samples(&[0i16; 1600]);
        assert_eq!(frame.level_db(), defaults::DB_FLOOR);
    }

    #[test]
    fn test_from_samples_full_scale() {
        let frame = LevelFrame::from_samples(&[i16::MAX; 1600]);
        assert!(frame.level_db().abs() < 0.1, "got {}", frame.level_db());
    }

    #[test]
    fn test_from_samples_negative_amplitudes_count() {
        let positive = LevelFrame::from_samples(&[8000i16; 1600]);
        let negative = LevelFrame::from_samples(&[-8000i16; 1600]);
        assert_eq!(positive.level_db(), negative.level_db());
    }

    #[test]
    fn test_from_samples_bin_count_is_bounded() {
        let frame = LevelFrame::from_samples(&[100i16; 4096]);
        assert!(frame.bins.len() <= defaults::LEVEL_BINS);

        let short = LevelFrame::from_samples(&[100i16; 10]);
        assert_eq!(short.bins.len(), 10);
    }
}
