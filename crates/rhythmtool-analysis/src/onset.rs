//! Onset detection.
//!
//! Estimates times at which onsets occur in a song. An onset is the
//! start of a note. The detection function is a band-limited spectral
//! difference, normalized against a running mean and variance, peak
//! picked with a center-lagged look-ahead buffer.

use crate::analysis::{feature_track, Analysis, Emitter, FrameConfig, TrackOutput};
use crate::feature::Onset;
use rhythmtool_dsp::stats;

/// Default normalization amount.
const DEFAULT_NORMALIZATION: f32 = 0.2;

/// Default peak-picking threshold.
const DEFAULT_THRESHOLD: f32 = 0.3;

/// Default look-ahead buffer length in frames.
const DEFAULT_BUFFER_SIZE: usize = 12;

/// Detects note onsets in the frame stream.
pub struct OnsetDetector {
    /// Normalization amount (0 - 1). Higher values help find onsets in
    /// quiet songs, but can increase false positives.
    normalization: f32,
    /// Peak-picking threshold (0 - 1). Lower values make detection more
    /// sensitive, but can increase false positives.
    threshold: f32,
    /// Look-ahead buffer length; determines the minimum time between
    /// detected onsets and how much surrounding data feeds the
    /// threshold.
    buffer_size: usize,

    config: FrameConfig,
    emitter: Option<Emitter<Onset>>,

    band_end: usize,
    buffer: Vec<f32>,
    prev_magnitude: Vec<f32>,

    mean: f32,
    m2: f32,
}

impl OnsetDetector {
    pub fn new() -> Self {
        Self {
            normalization: DEFAULT_NORMALIZATION,
            threshold: DEFAULT_THRESHOLD,
            buffer_size: DEFAULT_BUFFER_SIZE,
            config: FrameConfig {
                sample_rate: 0,
                frame_size: 0,
                hop_size: 0,
            },
            emitter: None,
            band_end: 0,
            buffer: Vec::new(),
            prev_magnitude: Vec::new(),
            mean: 1.0,
            m2: 0.0,
        }
    }

    /// Set the normalization amount (clamped to 0 - 1).
    pub fn set_normalization(&mut self, normalization: f32) {
        self.normalization = normalization.clamp(0.0, 1.0);
    }

    /// Set the peak-picking threshold (clamped to 0 - 1).
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.0, 1.0);
    }

    /// Set the look-ahead buffer length in frames (clamped to 2 - 32).
    /// Takes effect on the next run.
    pub fn set_buffer_size(&mut self, buffer_size: usize) {
        self.buffer_size = buffer_size.clamp(2, 32);
    }

    /// Band-limited spectral difference against the previous frame.
    fn spectral_difference(&mut self, magnitude: &[f32]) -> f32 {
        let end = self.band_end.min(magnitude.len());
        let mut diff = 0.0;

        for i in 0..end {
            let temp = magnitude[i] * magnitude[i]
                - self.prev_magnitude[i] * self.prev_magnitude[i];
            diff += temp.abs().sqrt();
        }

        self.prev_magnitude.copy_from_slice(magnitude);

        diff / end as f32
    }

    /// Normalize a detection sample against the running mean and
    /// standard deviation of everything seen so far.
    fn normalize(&mut self, sample: f32, frame_index: usize) -> f32 {
        let count = (frame_index + 1) as f32;

        let delta = sample - self.mean;
        self.mean += delta / count;
        self.m2 += delta * (sample - self.mean);

        let variance = self.m2 / count;
        let standard_deviation = variance.sqrt();

        if standard_deviation == 0.0 {
            return 0.0;
        }

        stats::lerp(
            sample,
            (sample - self.mean) / standard_deviation,
            self.normalization,
        )
    }
}

impl Default for OnsetDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Analysis for OnsetDetector {
    fn name(&self) -> &str {
        "Onsets"
    }

    fn initialize(&mut self, config: FrameConfig) -> TrackOutput {
        self.config = config;
        self.band_end = config.frame_size / 2 - 2;
        self.buffer = vec![0.0; self.buffer_size];
        self.prev_magnitude = vec![0.0; config.frame_size / 2];
        self.mean = 1.0;
        self.m2 = 0.0;

        let (emitter, output) = feature_track(self.name());
        self.emitter = Some(emitter);

        output
    }

    fn process(&mut self, _samples: &[f32], magnitude: &[f32], frame_index: usize) {
        let sample = self.spectral_difference(magnitude);
        let sample = self.normalize(sample, frame_index);
        self.buffer[frame_index % self.buffer_size] = sample;

        let half = self.buffer_size / 2;

        if frame_index < half {
            return;
        }

        // Decisions lag by half the buffer so the peak pick can look
        // ahead within it.
        let max = stats::max_index(&self.buffer);
        let current = (frame_index - half) % self.buffer_size;

        if current == max {
            let peak = self.buffer[max];
            let average = stats::mean(&self.buffer);

            if peak > average + self.threshold {
                if let Some(emitter) = &self.emitter {
                    emitter.emit(Onset {
                        timestamp: self.config.frame_to_seconds((frame_index - half) as f32),
                        strength: peak,
                    });
                }
            }
        }
    }
}
