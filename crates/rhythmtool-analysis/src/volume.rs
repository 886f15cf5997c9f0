//! Volume sampling.
//!
//! Samples the average level of the magnitude spectrum at a fixed
//! interval, with optional extra smoothing over past blocks.

use crate::analysis::{feature_track, Analysis, Emitter, FrameConfig, TrackOutput};
use crate::feature::Value;
use rhythmtool_dsp::{stats, window};

/// Default sampling interval in frames.
const DEFAULT_INTERVAL: usize = 4;

/// Default smoothing amount.
const DEFAULT_SMOOTHING: usize = 8;

/// Samples volume from the frame stream.
pub struct VolumeSampler {
    /// How often to sample volume, in frames (1 - 64).
    interval: usize,
    /// How much smoothing is applied (0 - 16).
    smoothing: usize,

    config: FrameConfig,
    emitter: Option<Emitter<Value>>,

    buffer: Vec<f32>,

    smoothing_len: usize,
    smoothing_buffer: Vec<f32>,
    smoothing_kernel: Vec<f32>,
    kernel_weight: f32,
}

impl VolumeSampler {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            smoothing: DEFAULT_SMOOTHING,
            config: FrameConfig {
                sample_rate: 0,
                frame_size: 0,
                hop_size: 0,
            },
            emitter: None,
            buffer: Vec::new(),
            smoothing_len: 0,
            smoothing_buffer: Vec::new(),
            smoothing_kernel: Vec::new(),
            kernel_weight: 0.0,
        }
    }

    /// Set the sampling interval in frames (clamped to 1 - 64). Takes
    /// effect on the next run.
    pub fn set_interval(&mut self, interval: usize) {
        self.interval = interval.clamp(1, 64);
    }

    /// Set the smoothing amount (clamped to 0 - 16). Takes effect on the
    /// next run.
    pub fn set_smoothing(&mut self, smoothing: usize) {
        self.smoothing = smoothing.clamp(0, 16);
    }
}

impl Default for VolumeSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Analysis for VolumeSampler {
    fn name(&self) -> &str {
        "Volume"
    }

    fn initialize(&mut self, config: FrameConfig) -> TrackOutput {
        self.config = config;

        self.buffer = vec![0.0; self.interval];

        if self.smoothing == 0 {
            self.smoothing_len = 0;
            self.smoothing_buffer = Vec::new();
            self.smoothing_kernel = Vec::new();
            self.kernel_weight = 0.0;
        } else {
            self.smoothing_len = self.smoothing + 2;
            self.smoothing_kernel = window::hann_window(self.smoothing_len);
            self.smoothing_buffer = vec![0.0; self.smoothing_len];
            self.kernel_weight = self.smoothing_kernel.iter().sum();
        }

        let (emitter, output) = feature_track(self.name());
        self.emitter = Some(emitter);

        output
    }

    fn process(&mut self, _samples: &[f32], magnitude: &[f32], frame_index: usize) {
        let mean = stats::mean(magnitude);

        let index = frame_index % self.interval;
        self.buffer[index] = mean;

        // Emit once per complete block.
        if index != self.interval - 1 {
            return;
        }

        let mut value = stats::mean(&self.buffer);

        if self.smoothing_len > 0 {
            self.smoothing_buffer.copy_within(1.., 0);
            self.smoothing_buffer[self.smoothing_len - 1] = value;

            value = stats::weighted_sum(
                &self.smoothing_buffer,
                &self.smoothing_kernel,
                self.smoothing_len / 2,
            ) / self.kernel_weight;
        }

        if let Some(emitter) = &self.emitter {
            let compensation = (self.interval * self.smoothing_len / 2) as f32;

            emitter.emit(Value {
                timestamp: self.config.frame_to_seconds(frame_index as f32 - compensation),
                value,
            });
        }
    }
}
