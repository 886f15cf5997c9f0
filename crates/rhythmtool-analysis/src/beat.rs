//! Beat tracking.
//!
//! Estimates at which points beats occur in the song. The tracker keeps
//! a rolling onset-strength signal derived from spectral flux, and
//! periodically re-estimates the beat period with a comb-filtered
//! autocorrelation, then locks the beat phase by correlating a periodic
//! comb against the smoothed signal at every candidate offset.

use crate::analysis::{feature_track, Analysis, Emitter, FrameConfig, TrackOutput};
use crate::feature::Beat;
use rhythmtool_dsp::{stats, window};

/// Sub-frame resolution of the beat period estimate.
const RESOLUTION: usize = 10;

/// Number of harmonics summed by the comb filter.
const COMB_ELEMENTS: usize = 8;

/// Smoothing factor for score updates across estimation rounds.
const SCORE_SMOOTHING: f32 = 0.1;

/// Offset scores below this leave the tracker without a beat phase.
const MIN_OFFSET_SCORE: f32 = 0.15;

/// Relative beat-length change beyond which the phase history resets.
const LENGTH_RESET_FRACTION: f32 = 0.1;

/// Tracks the beat of the frame stream.
pub struct BeatTracker {
    config: FrameConfig,
    emitter: Option<Emitter<Beat>>,

    signal_buffer: Vec<f32>,
    signal: Vec<f32>,
    smoothed_signal: Vec<f32>,

    auto_correlation: Vec<f32>,
    comb_filter: Vec<f32>,

    length_score: Vec<f32>,
    offset_score: Vec<f32>,

    signal_window: Vec<f32>,
    offset_window: Vec<f32>,
    kernel: Vec<f32>,

    prev_magnitude: Vec<f32>,
    prev_spectral_flux: f32,

    max_beat_length: usize,
    min_beat_length: usize,
    beat_length: usize,
    prev_beat_length: usize,

    beat_offset: i64,
    update_countdown: i64,

    buffer_size: usize,
    frame_index: usize,
}

impl BeatTracker {
    pub fn new() -> Self {
        Self {
            config: FrameConfig {
                sample_rate: 0,
                frame_size: 0,
                hop_size: 0,
            },
            emitter: None,
            signal_buffer: Vec::new(),
            signal: Vec::new(),
            smoothed_signal: Vec::new(),
            auto_correlation: Vec::new(),
            comb_filter: Vec::new(),
            length_score: Vec::new(),
            offset_score: Vec::new(),
            signal_window: Vec::new(),
            offset_window: Vec::new(),
            kernel: Vec::new(),
            prev_magnitude: Vec::new(),
            prev_spectral_flux: 0.0,
            max_beat_length: 0,
            min_beat_length: 0,
            beat_length: 0,
            prev_beat_length: 0,
            beat_offset: -1,
            update_countdown: 0,
            buffer_size: 0,
            frame_index: 0,
        }
    }

    /// Change in overall spectral flux since the previous frame.
    fn flux_sample(&mut self, magnitude: &[f32]) -> f32 {
        let mut flux = 0.0;

        for (current, prev) in magnitude.iter().zip(&self.prev_magnitude) {
            flux += (current - prev).max(0.0);
        }

        self.prev_magnitude.copy_from_slice(magnitude);

        let sample = flux - self.prev_spectral_flux;
        self.prev_spectral_flux = flux;

        sample
    }

    /// Linearize the ring buffer, smooth it and de-emphasize its older
    /// half.
    fn update_signal(&mut self) {
        for i in 0..self.buffer_size {
            self.signal[i] = self.signal_buffer[(i + self.frame_index + 1) % self.buffer_size];
        }

        let len = self.signal.len();
        self.signal[..4].fill(0.0);
        self.signal[len - 4..].fill(0.0);

        stats::smooth(&self.signal, &mut self.smoothed_signal, &self.kernel);

        for (sample, weight) in self.smoothed_signal.iter_mut().zip(&self.signal_window) {
            *sample *= weight;
        }
    }

    /// Re-estimate the beat period from the comb-filtered
    /// autocorrelation.
    fn update_length(&mut self) {
        self.update_auto_correlation();
        self.update_length_score();

        let start = self.min_beat_length * RESOLUTION;
        self.beat_length = start + stats::max_index(&self.length_score[start..]);

        if self.beat_length != self.prev_beat_length {
            for i in 0..self.beat_length {
                self.offset_window[i] = 0.75 + window::hann_value(i, self.beat_length) * 0.25;
            }

            self.offset_score[self.beat_length..].fill(0.0);

            let change = (self.beat_length as f32 - self.prev_beat_length as f32).abs();

            if change / (self.min_beat_length * RESOLUTION) as f32 > LENGTH_RESET_FRACTION {
                self.offset_score.fill(0.0);
            }
        }

        self.prev_beat_length = self.beat_length;
    }

    fn update_auto_correlation(&mut self) {
        let start = self.min_beat_length / 2;

        for i in start..self.auto_correlation.len() {
            let mut sum = 0.0;

            for j in 0..self.smoothed_signal.len() - i {
                sum += self.smoothed_signal[j] * self.smoothed_signal[j + i];
            }

            self.auto_correlation[i] = sum / (self.smoothed_signal.len() - i) as f32;
        }

        let max = stats::max(&self.auto_correlation[start..]);

        if max < 1.0 {
            return;
        }

        for value in &mut self.auto_correlation {
            *value /= max;
        }
    }

    fn update_length_score(&mut self) {
        for i in self.min_beat_length * RESOLUTION / 2..self.comb_filter.len() - 1 {
            let period = i as f32 / RESOLUTION as f32;
            let mut sum = 0.0;

            for j in 0..COMB_ELEMENTS {
                sum += stats::interpolate(&self.auto_correlation, (j + 1) as f32 * period);
            }

            self.comb_filter[i] = sum / COMB_ELEMENTS as f32;
        }

        // Combine each candidate with its half and double period to
        // counter octave errors.
        for i in self.min_beat_length * RESOLUTION..self.length_score.len() {
            let score = self.comb_filter[i] + self.comb_filter[i / 2] + self.comb_filter[i * 2];

            self.length_score[i] = stats::lerp(self.length_score[i], score, SCORE_SMOOTHING);
        }
    }

    /// Re-derive the frames-until-next-beat phase offset.
    fn update_phase(&mut self) {
        let period = self.beat_length as f32 / RESOLUTION as f32;

        for i in 0..self.beat_length {
            let offset = i as f32 / RESOLUTION as f32;
            let offset = self.buffer_size as f32 - 1.0 - (period - offset);
            let n = (offset / period).round() as usize;

            let mut sum = 0.0;

            for j in 0..n {
                sum += stats::interpolate(&self.smoothed_signal, offset - j as f32 * period);
            }

            let score = (sum / n as f32) * self.offset_window[i];

            self.offset_score[i] = stats::lerp(self.offset_score[i], score, SCORE_SMOOTHING);
        }

        let max = stats::max_index(&self.offset_score[..self.beat_length]);

        self.beat_offset = (max as f32 / RESOLUTION as f32).round() as i64;
        self.update_countdown = self.beat_offset + (self.beat_length / 2 / RESOLUTION) as i64;

        if self.offset_score[max] < MIN_OFFSET_SCORE {
            self.beat_offset = -1;
        }
    }
}

impl Default for BeatTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Analysis for BeatTracker {
    fn name(&self) -> &str {
        "Beats"
    }

    fn initialize(&mut self, config: FrameConfig) -> TrackOutput {
        self.config = config;

        let frames_per_minute = (config.sample_rate as f32 * 60.0) / config.hop_size as f32;
        self.max_beat_length = (frames_per_minute / 80.0).round() as usize;
        self.min_beat_length = (frames_per_minute / 160.0).round() as usize;

        self.buffer_size = self.max_beat_length * COMB_ELEMENTS * 2;

        self.signal_buffer = vec![0.0; self.buffer_size];
        self.signal = vec![0.0; self.buffer_size];
        self.smoothed_signal = vec![0.0; self.buffer_size];

        self.auto_correlation = vec![0.0; self.buffer_size];
        self.comb_filter = vec![0.0; self.max_beat_length * 2 * RESOLUTION];

        self.length_score = vec![0.0; self.max_beat_length * RESOLUTION];
        self.offset_score = vec![0.0; self.max_beat_length * RESOLUTION];

        self.signal_window = (0..self.buffer_size / 2)
            .map(|i| window::hann_value(i, self.buffer_size))
            .collect();

        self.kernel = window::hann_window(8);

        self.offset_window = vec![0.0; self.max_beat_length * RESOLUTION];

        self.prev_magnitude = vec![0.0; config.frame_size / 2];
        self.prev_spectral_flux = 0.0;

        self.prev_beat_length = 0;
        self.beat_length = (self.min_beat_length + self.min_beat_length / 2) * RESOLUTION;
        self.update_countdown = self.max_beat_length as i64;
        self.beat_offset = -1;

        let (emitter, output) = feature_track(self.name());
        self.emitter = Some(emitter);

        output
    }

    fn process(&mut self, _samples: &[f32], magnitude: &[f32], frame_index: usize) {
        self.frame_index = frame_index;

        let sample = self.flux_sample(magnitude);
        self.signal_buffer[frame_index % self.buffer_size] = sample;

        self.beat_offset -= 1;
        self.update_countdown -= 1;

        if self.update_countdown == 0 {
            self.update_signal();
            self.update_length();
            self.update_phase();
        }

        if self.beat_offset == 0 {
            if let Some(emitter) = &self.emitter {
                let beat_frames = self.beat_length as f32 / RESOLUTION as f32;

                emitter.emit(Beat {
                    timestamp: self.config.frame_to_seconds(frame_index as f32),
                    bpm: 60.0 / self.config.frame_to_seconds(beat_frames),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AnyTrack;

    fn config() -> FrameConfig {
        FrameConfig {
            sample_rate: 44100,
            frame_size: 2048,
            hop_size: 1024,
        }
    }

    fn drive_click_track(
        tracker: &mut BeatTracker,
        output: &mut TrackOutput,
        period_frames: usize,
        total_frames: usize,
    ) {
        let quiet = vec![0.0f32; 1024];
        let loud = vec![4.0f32; 1024];

        for frame in 0..total_frames {
            let magnitude = if frame % period_frames == 0 {
                &loud
            } else {
                &quiet
            };

            tracker.process(&[], magnitude, frame);
        }

        output.drain();
    }

    #[test]
    fn test_silence_produces_no_beats() {
        let mut tracker = BeatTracker::new();
        let mut output = tracker.initialize(config());

        let magnitude = vec![0.0f32; 1024];

        for frame in 0..600 {
            tracker.process(&[], &magnitude, frame);
        }

        output.drain();
        assert!(output.track().is_empty());
    }

    #[test]
    fn test_click_track_bpm_converges() {
        let config = config();
        let mut tracker = BeatTracker::new();
        let mut output = tracker.initialize(config);

        // Clicks every 21 frames: 21 * 1024 / 44100 s period.
        let period_frames = 21;
        let expected_bpm = 60.0 / config.frame_to_seconds(period_frames as f32);

        drive_click_track(&mut tracker, &mut output, period_frames, 3000);

        let track = output.track();
        assert!(!track.is_empty(), "expected beats on a click track");

        if let AnyTrack::Beats(track) = track {
            let track = track.read();

            // After the warm-up the tempo estimate settles within 2%.
            let settled: Vec<_> = track
                .features()
                .iter()
                .filter(|b| b.timestamp > config.frame_to_seconds(1500.0))
                .collect();

            assert!(!settled.is_empty(), "expected beats after warm-up");

            for beat in settled {
                let error = (beat.bpm - expected_bpm).abs() / expected_bpm;
                assert!(
                    error < 0.02,
                    "bpm {} deviates from expected {} by {}",
                    beat.bpm,
                    expected_bpm,
                    error
                );
            }
        } else {
            panic!("expected a beat track");
        }
    }

    #[test]
    fn test_beat_period_in_supported_range() {
        let mut tracker = BeatTracker::new();
        let mut output = tracker.initialize(config());

        // 26 frames is ~99 BPM at these settings.
        drive_click_track(&mut tracker, &mut output, 26, 3000);

        if let AnyTrack::Beats(track) = output.track() {
            let track = track.read();

            for beat in track.features() {
                assert!(beat.bpm > 70.0 && beat.bpm < 170.0, "bpm {}", beat.bpm);
            }
        }
    }
}
