//! Chromagram analysis.
//!
//! Detects the most prominent notes at different times in the song. The
//! hop-rate stream is decimated into a rolling buffer, giving a spectrum
//! with enough resolution in the low octaves to separate semitones. Per
//! MIDI note, a local spectral peak is folded into 12 pitch classes;
//! notes are segmented with activation hysteresis.

use crate::analysis::{feature_track, Analysis, Emitter, FrameConfig, TrackOutput};
use crate::feature::{Chroma, Note};
use rhythmtool_dsp::{fft, stats, window, RealFft};

/// First analyzed MIDI note (A0).
const START_NOTE: usize = 21;

/// One past the last analyzed MIDI note.
const END_NOTE: usize = 89;

/// Length of the downsampled analysis buffer.
const BUFFER_SIZE: usize = 2048;

/// Decimation factor applied to the hop-rate stream.
const DOWNSAMPLE_FACTOR: usize = 16;

/// Frames between chroma updates.
const CHROMA_INTERVAL: usize = 4;

/// Normalized level at which a pitch class becomes active.
const ACTIVATE_THRESHOLD: f32 = 0.9;

/// Normalized level below which an active pitch class releases.
const RELEASE_THRESHOLD: f32 = 0.8;

/// Active intervals shorter than this many frames are dropped.
const MIN_NOTE_FRAMES: usize = 5;

/// Relative width of the spectral peak search window around each note.
const NOTE_WINDOW_FRACTION: f32 = 0.015;

/// Detects prominent pitch classes in the frame stream.
pub struct Chromagram {
    config: FrameConfig,
    emitter: Option<Emitter<Chroma>>,

    note_indices: Vec<usize>,

    downsampled: Vec<f32>,
    spectrum: Vec<f32>,
    magnitude: Vec<f32>,

    window: Vec<f32>,
    pitch_window: Vec<f32>,

    pitch: Vec<f32>,
    chroma: Vec<f32>,

    /// Latency of the downsampled buffer in frames.
    offset: usize,

    /// Per pitch class, the frame it became active at; 0 when inactive.
    chroma_history: [usize; 12],

    fft: RealFft,
    frame_index: usize,
}

impl Chromagram {
    pub fn new() -> Self {
        Self {
            config: FrameConfig {
                sample_rate: 0,
                frame_size: 0,
                hop_size: 0,
            },
            emitter: None,
            note_indices: Vec::new(),
            downsampled: Vec::new(),
            spectrum: Vec::new(),
            magnitude: Vec::new(),
            window: Vec::new(),
            pitch_window: Vec::new(),
            pitch: Vec::new(),
            chroma: Vec::new(),
            offset: 0,
            chroma_history: [0; 12],
            fft: RealFft::new(BUFFER_SIZE),
            frame_index: 0,
        }
    }

    /// Shift the decimated stream into the rolling buffer.
    fn downsample(&mut self, samples: &[f32]) {
        let length = self.config.hop_size / DOWNSAMPLE_FACTOR;
        let start = self.config.frame_size - self.config.hop_size;

        self.downsampled.copy_within(length.., 0);

        for i in 0..length {
            let mut sum = 0.0;

            for j in 0..DOWNSAMPLE_FACTOR {
                sum += samples[start + i * DOWNSAMPLE_FACTOR + j];
            }

            self.downsampled[BUFFER_SIZE - length + i] = sum / DOWNSAMPLE_FACTOR as f32;
        }
    }

    fn update_chroma(&mut self) {
        self.spectrum.copy_from_slice(&self.downsampled);

        window::apply_window(&mut self.spectrum, &self.window);
        self.fft.forward(&mut self.spectrum);
        fft::spectrum_magnitude(&self.spectrum, &mut self.magnitude);

        for i in 0..self.pitch.len() {
            let index = self.note_indices[i];
            let width = (index as f32 * NOTE_WINDOW_FRACTION).floor() as usize;

            let start = index.saturating_sub(width).min(self.magnitude.len() - 1);
            let end = (index + width).min(self.magnitude.len());

            let max_pitch = if start < end {
                stats::max(&self.magnitude[start..end])
            } else {
                self.magnitude[start]
            };

            self.pitch[i] = max_pitch * max_pitch * self.pitch_window[i];
        }

        self.chroma.fill(0.0);

        for (i, &pitch) in self.pitch.iter().enumerate() {
            self.chroma[i % 12] += pitch;
        }

        let max = stats::max(&self.chroma);
        let mean = stats::mean(&self.chroma);

        if max - mean == 0.0 {
            self.chroma.fill(0.0);
        } else {
            for value in &mut self.chroma {
                *value = (*value - mean) / (max - mean);
            }
        }

        for i in 0..self.chroma.len() {
            if self.chroma[i] >= ACTIVATE_THRESHOLD && self.chroma_history[i] == 0 {
                self.chroma_history[i] = self.frame_index;
            }

            if self.chroma[i] < RELEASE_THRESHOLD && self.chroma_history[i] != 0 {
                let start = self.chroma_history[i];

                if self.frame_index - start > MIN_NOTE_FRAMES {
                    if let Some(emitter) = &self.emitter {
                        emitter.emit(Chroma {
                            timestamp: self
                                .config
                                .frame_to_seconds(start as f32 - self.offset as f32),
                            length: self
                                .config
                                .frame_to_seconds((self.frame_index - start) as f32),
                            note: Note::from_index(i),
                        });
                    }
                }

                self.chroma_history[i] = 0;
            }
        }
    }

    fn frequency_to_index(frequency: f32, length: usize, sample_rate: usize) -> usize {
        (length as f32 * frequency / sample_rate as f32).round() as usize
    }

    fn midi_frequency(note: usize) -> f32 {
        2.0f32.powf((note as f32 - 69.0) / 12.0) * 440.0
    }
}

impl Default for Chromagram {
    fn default() -> Self {
        Self::new()
    }
}

impl Analysis for Chromagram {
    fn name(&self) -> &str {
        "Chroma"
    }

    fn initialize(&mut self, config: FrameConfig) -> TrackOutput {
        self.config = config;

        let downsampled_rate = config.sample_rate as usize / DOWNSAMPLE_FACTOR;

        self.note_indices = (START_NOTE..END_NOTE)
            .map(|note| {
                let frequency = Self::midi_frequency(note);
                Self::frequency_to_index(frequency, BUFFER_SIZE, downsampled_rate)
                    .saturating_sub(1)
            })
            .collect();

        self.downsampled = vec![0.0; BUFFER_SIZE];
        self.spectrum = vec![0.0; BUFFER_SIZE];
        self.magnitude = vec![0.0; BUFFER_SIZE / 2];

        self.window = window::hann_window(BUFFER_SIZE);

        let note_count = self.note_indices.len();
        self.pitch_window = (0..note_count)
            .map(|i| window::hann_value(i, note_count * 2) + 0.1)
            .collect();

        self.pitch = vec![0.0; note_count];
        self.chroma = vec![0.0; 12];

        self.offset = (BUFFER_SIZE * DOWNSAMPLE_FACTOR) / config.hop_size / 2;

        self.chroma_history = [0; 12];

        let (emitter, output) = feature_track(self.name());
        self.emitter = Some(emitter);

        output
    }

    fn process(&mut self, samples: &[f32], _magnitude: &[f32], frame_index: usize) {
        self.frame_index = frame_index;

        self.downsample(samples);

        if frame_index % CHROMA_INTERVAL == 0 {
            self.update_chroma();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AnyTrack;
    use std::f32::consts::PI;

    fn config() -> FrameConfig {
        FrameConfig {
            sample_rate: 44100,
            frame_size: 2048,
            hop_size: 1024,
        }
    }

    /// Drive the chromagram with a tone for `tone_frames` hops followed
    /// by silence.
    fn drive_tone(
        chromagram: &mut Chromagram,
        output: &mut TrackOutput,
        frequency: f32,
        tone_frames: usize,
        total_frames: usize,
    ) {
        let config = config();

        for frame in 0..total_frames {
            let start = frame * config.hop_size;

            let samples: Vec<f32> = (0..config.frame_size)
                .map(|i| {
                    if frame < tone_frames {
                        let t = (start + i) as f32 / config.sample_rate as f32;
                        (2.0 * PI * frequency * t).sin() * 0.8
                    } else {
                        0.0
                    }
                })
                .collect();

            chromagram.process(&samples, &[], frame);
        }

        output.drain();
    }

    #[test]
    fn test_note_frequencies() {
        assert!((Chromagram::midi_frequency(69) - 440.0).abs() < 1e-3);
        assert!((Chromagram::midi_frequency(57) - 220.0).abs() < 1e-3);
        assert!((Chromagram::midi_frequency(21) - 27.5).abs() < 1e-3);
    }

    #[test]
    fn test_silence_produces_no_chroma() {
        let mut chromagram = Chromagram::new();
        let mut output = chromagram.initialize(config());

        let samples = vec![0.0f32; 2048];

        for frame in 0..400 {
            chromagram.process(&samples, &[], frame);

            for &value in &chromagram.chroma {
                assert!(value.is_finite());
            }
        }

        output.drain();
        assert!(output.track().is_empty());
    }

    #[test]
    fn test_sustained_tone_emits_its_pitch_class() {
        let mut chromagram = Chromagram::new();
        let mut output = chromagram.initialize(config());

        // 440 Hz is pitch class A.
        drive_tone(&mut chromagram, &mut output, 440.0, 220, 320);

        let track = output.track();
        assert!(!track.is_empty(), "expected at least one chroma feature");

        if let AnyTrack::Chroma(track) = track {
            let track = track.read();

            let longest = track
                .features()
                .iter()
                .max_by(|a, b| a.length.total_cmp(&b.length))
                .copied()
                .unwrap();

            assert_eq!(longest.note, Note::A);
            assert!(
                longest.length > 1.0,
                "expected a sustained note, got {} s",
                longest.length
            );
        } else {
            panic!("expected a chroma track");
        }
    }
}
