//! The per-frame analysis stage contract.
//!
//! An [`Analysis`] consumes one frame of mono samples plus its magnitude
//! spectrum per hop, strictly in increasing frame order, and emits
//! features into its track through a thread-safe queue. Features are
//! enqueued on the analysis thread and applied to the shared track at a
//! single drain point on the foreground thread, before any reader
//! observes the track.

use crate::data::AnyTrack;
use crate::feature::Feature;
use crate::track::{SharedTrack, Track};
use crossbeam_channel::{Receiver, Sender};

/// Frame parameters for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Sample rate of the audio data in Hz.
    pub sample_rate: u32,
    /// Number of samples in each frame.
    pub frame_size: usize,
    /// Number of samples to move in between frames.
    pub hop_size: usize,
}

impl FrameConfig {
    /// Analysis frames per second of audio.
    pub fn frames_per_second(&self) -> f32 {
        self.sample_rate as f32 / self.hop_size as f32
    }

    /// Convert a (possibly fractional or negative) frame index to a
    /// timestamp in seconds.
    pub fn frame_to_seconds(&self, frame: f32) -> f32 {
        frame / self.frames_per_second()
    }
}

/// A processor that extracts one kind of feature from the frame stream.
///
/// `initialize` is called once per run and must reset all rolling state;
/// it hands back the [`TrackOutput`] binding the run's fresh track.
/// `process` is then called exactly once per hop with strictly
/// increasing frame indices.
pub trait Analysis: Send {
    /// The name of the analysis and its resulting track.
    fn name(&self) -> &str;

    /// Reset state for new audio data and create the run's track.
    fn initialize(&mut self, config: FrameConfig) -> TrackOutput;

    /// Process one frame of mono samples and its magnitude spectrum.
    fn process(&mut self, samples: &[f32], magnitude: &[f32], frame_index: usize);
}

/// Producer half of a feature queue, held by the analysis.
#[derive(Debug, Clone)]
pub struct Emitter<T: Feature> {
    tx: Sender<T>,
}

impl<T: Feature> Emitter<T> {
    /// Queue a feature for the next drain. Silently drops the feature if
    /// the run has ended.
    pub fn emit(&self, feature: T) {
        let _ = self.tx.send(feature);
    }
}

/// Consumer half of a feature queue: the run's shared track plus the
/// pending features not yet applied to it.
pub struct TrackOutput {
    track: AnyTrack,
    drain: Box<dyn Drain>,
}

impl TrackOutput {
    /// The track this analysis populates.
    pub fn track(&self) -> &AnyTrack {
        &self.track
    }

    /// Apply all queued features to the track. Must be called from a
    /// single consumer thread.
    pub fn drain(&mut self) {
        self.drain.apply();
    }
}

trait Drain: Send {
    fn apply(&mut self);
}

struct QueueDrain<T: Feature> {
    rx: Receiver<T>,
    track: SharedTrack<T>,
}

impl<T: Feature> Drain for QueueDrain<T> {
    fn apply(&mut self) {
        if self.rx.is_empty() {
            return;
        }

        let mut track = self.track.write();

        while let Ok(feature) = self.rx.try_recv() {
            track.add(feature);
        }
    }
}

/// Create a fresh track plus the emitter feeding it, for one run of an
/// analysis.
pub fn feature_track<T: Feature>(name: &str) -> (Emitter<T>, TrackOutput) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let track = SharedTrack::new(Track::new(name));

    let output = TrackOutput {
        track: T::wrap_track(track.clone()),
        drain: Box::new(QueueDrain { rx, track }),
    };

    (Emitter { tx }, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Onset;

    #[test]
    fn test_emitted_features_appear_after_drain() {
        let (emitter, mut output) = feature_track::<Onset>("Onsets");

        emitter.emit(Onset {
            timestamp: 1.0,
            strength: 0.5,
        });
        emitter.emit(Onset {
            timestamp: 0.5,
            strength: 0.25,
        });

        assert!(output.track().is_empty());

        output.drain();

        let track = output.track();
        assert_eq!(track.len(), 2);
        assert_eq!(track.name(), "Onsets");

        // The drain keeps the track sorted regardless of emit order.
        if let AnyTrack::Onsets(track) = track {
            let track = track.read();
            assert_eq!(track[0].timestamp, 0.5);
            assert_eq!(track[1].timestamp, 1.0);
        } else {
            panic!("expected an onset track");
        }
    }

    #[test]
    fn test_emit_from_worker_thread() {
        let (emitter, mut output) = feature_track::<Onset>("Onsets");

        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                emitter.emit(Onset {
                    timestamp: i as f32 * 0.01,
                    strength: 1.0,
                });
            }
        });

        handle.join().unwrap();
        output.drain();

        assert_eq!(output.track().len(), 100);
    }

    #[test]
    fn test_frame_config_seconds() {
        let config = FrameConfig {
            sample_rate: 44100,
            frame_size: 2048,
            hop_size: 1024,
        };

        approx::assert_relative_eq!(config.frame_to_seconds(43.066406), 1.0, epsilon = 1e-3);
        approx::assert_relative_eq!(config.frame_to_seconds(-43.066406), -1.0, epsilon = 1e-3);
    }
}
