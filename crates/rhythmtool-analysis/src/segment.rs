//! Segment detection.
//!
//! Finds points where the average volume of the song changes a lot.
//! Such changes often separate sections of a song. The low-band energy
//! is smoothed through cascaded stages; a change interval opens when the
//! slope of the final signal gets steep, tracks its steepest frame, and
//! closes once the slope flattens out again.

use crate::analysis::{feature_track, Analysis, Emitter, FrameConfig, TrackOutput};
use crate::feature::Value;
use rhythmtool_dsp::{stats, window};

/// Default detection threshold.
const DEFAULT_THRESHOLD: f32 = 22.0;

/// Default smoothing amount.
const DEFAULT_SMOOTHING: usize = 8;

/// Weights applied to the frame and value deltas of a change interval
/// before comparing its size against the threshold. Tuned values carried
/// over unchanged.
const CHANGE_WEIGHT: (f32, f32) = (0.1, 10.0);

/// Slope that opens a change interval.
const CHANGE_START_SLOPE: f32 = 0.005;

/// Slope below which a change interval closes.
const CHANGE_END_SLOPE: f32 = 0.002;

/// Number of cascaded smoothing stages.
const ITERATIONS: usize = 4;

/// Magnitude bins feeding the low-band energy signal.
const LOW_BAND_BINS: usize = 350;

/// Detects large volume changes in the frame stream.
pub struct Segmenter {
    /// Threshold for detecting large differences in volume (0 - 64).
    threshold: f32,
    /// How much smoothing is applied to the signal (1 - 16).
    smoothing: usize,

    config: FrameConfig,
    emitter: Option<Emitter<Value>>,

    buffer_size: usize,
    buffer: Vec<Vec<f32>>,
    kernel: Vec<f32>,
    kernel_weight: f32,

    current: f32,
    next: f32,

    change: bool,
    change_sign: f32,
    change_start: (f32, f32),

    max_slope: f32,
    max_slope_index: i64,

    frame_index: usize,
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            smoothing: DEFAULT_SMOOTHING,
            config: FrameConfig {
                sample_rate: 0,
                frame_size: 0,
                hop_size: 0,
            },
            emitter: None,
            buffer_size: 0,
            buffer: Vec::new(),
            kernel: Vec::new(),
            kernel_weight: 0.0,
            current: 0.0,
            next: 0.0,
            change: false,
            change_sign: 0.0,
            change_start: (0.0, 0.0),
            max_slope: 0.0,
            max_slope_index: 0,
            frame_index: 0,
        }
    }

    /// Set the detection threshold (clamped to 0 - 64).
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.0, 64.0);
    }

    /// Set the smoothing amount (clamped to 1 - 16). Takes effect on the
    /// next run.
    pub fn set_smoothing(&mut self, smoothing: usize) {
        self.smoothing = smoothing.clamp(1, 16);
    }

    /// Frame latency introduced by the cascaded smoothing stages.
    fn latency(&self) -> i64 {
        (self.buffer_size / 2 * ITERATIONS) as i64
    }

    fn find_segments(&mut self) {
        let slope = (self.next - self.current).abs();

        if slope > self.max_slope {
            self.max_slope = slope;
            self.max_slope_index = self.frame_index as i64 - self.latency();
        }

        self.find_change_end(slope);
        self.find_change_start(slope);
    }

    fn find_change_end(&mut self, slope: f32) {
        if !(self.change && slope * self.change_sign < CHANGE_END_SLOPE) {
            return;
        }

        let mut required_length = self.threshold;

        if slope.abs() < CHANGE_START_SLOPE {
            required_length *= 0.75;
        }

        let position = (self.frame_index as i64 - self.latency()) as f32;
        let dx = (position - self.change_start.0) * CHANGE_WEIGHT.0;
        let dy = (self.current - self.change_start.1) * CHANGE_WEIGHT.1;

        if (dx * dx + dy * dy).sqrt() > required_length {
            if let Some(emitter) = &self.emitter {
                emitter.emit(Value {
                    timestamp: self.config.frame_to_seconds(self.max_slope_index as f32),
                    value: self.current,
                });
            }
        }

        self.change = false;
    }

    fn find_change_start(&mut self, slope: f32) {
        if !self.change && slope.abs() > CHANGE_START_SLOPE {
            self.max_slope = slope;
            self.max_slope_index = self.frame_index as i64 - self.latency();

            self.change_start = (self.max_slope_index as f32, self.current);
            self.change = true;
            self.change_sign = slope.signum();
        }
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Analysis for Segmenter {
    fn name(&self) -> &str {
        "Segments"
    }

    fn initialize(&mut self, config: FrameConfig) -> TrackOutput {
        self.config = config;

        self.buffer_size = self.smoothing * 16;
        self.buffer = vec![vec![0.0; self.buffer_size]; ITERATIONS];

        self.kernel = window::hann_window(self.buffer_size);
        self.kernel_weight = self.kernel.iter().sum();

        self.current = 0.0;
        self.next = 0.0;
        self.change = false;
        self.change_sign = 0.0;
        self.change_start = (0.0, 0.0);

        self.max_slope = 0.0;
        self.max_slope_index = 0;

        let (emitter, output) = feature_track(self.name());
        self.emitter = Some(emitter);

        output
    }

    fn process(&mut self, _samples: &[f32], magnitude: &[f32], frame_index: usize) {
        self.frame_index = frame_index;

        let band = LOW_BAND_BINS.min(magnitude.len());
        let sample = stats::mean(&magnitude[..band]);

        // Each stage re-smooths the center of the previous stage's
        // rolling buffer.
        for i in 0..ITERATIONS {
            let value = if i == 0 {
                sample
            } else {
                stats::weighted_sum(&self.buffer[i - 1], &self.kernel, self.buffer_size / 2)
                    / self.kernel_weight
            };

            self.buffer[i].copy_within(1.., 0);
            self.buffer[i][self.buffer_size - 1] = value;
        }

        let sample =
            stats::weighted_sum(&self.buffer[ITERATIONS - 1], &self.kernel, self.buffer_size / 2)
                / self.kernel_weight;

        self.current = self.next;
        self.next = sample;

        self.find_segments();
    }
}
