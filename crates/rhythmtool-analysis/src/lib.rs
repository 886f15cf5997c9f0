//! # RhythmTool Analysis
//!
//! Offline audio feature extraction. A streaming pipeline takes decoded
//! PCM audio and produces time-stamped features - beats, onsets, chroma
//! events, segment markers and volume samples - via windowed FFT
//! analysis:
//!
//! - **Feature model**: [`Feature`] variants collected in sorted,
//!   range-queryable [`Track`]s, aggregated per run into [`RhythmData`]
//! - **Analyzers**: [`OnsetDetector`], [`BeatTracker`], [`Chromagram`],
//!   [`Segmenter`], [`VolumeSampler`], each implementing the per-frame
//!   [`Analysis`] contract
//! - **Orchestration**: [`RhythmAnalyzer`] runs the registered analyzers
//!   over an [`AudioProvider`] on a background worker, with progress,
//!   synchronous cancellation and an early "initialized" notification
//!
//! ## Example
//!
//! ```no_run
//! use rhythmtool_analysis::{
//!     Beat, BeatTracker, OnsetDetector, PcmClip, RhythmAnalyzer,
//! };
//!
//! let mut analyzer = RhythmAnalyzer::default();
//! analyzer.add_analysis(OnsetDetector::new());
//! analyzer.add_analysis(BeatTracker::new());
//!
//! let clip = PcmClip::from_mono(vec![0.0; 44100], 44100);
//! let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();
//!
//! while !analyzer.is_done() {
//!     analyzer.update();
//! }
//!
//! let mut beats = Vec::new();
//! data.features::<Beat>(&mut beats, 0.0, 1.0);
//! ```

pub mod analysis;
pub mod analyzer;
pub mod beat;
pub mod chroma;
pub mod data;
pub mod error;
pub mod feature;
pub mod onset;
pub mod provider;
pub mod segment;
pub mod track;
pub mod volume;

pub use analysis::{feature_track, Analysis, Emitter, FrameConfig, TrackOutput};
pub use analyzer::{AnalyzerConfig, AnalyzerState, RhythmAnalyzer};
pub use beat::BeatTracker;
pub use chroma::Chromagram;
pub use data::{AnyTrack, FeatureList, RhythmData, TrackRecord};
pub use error::{Error, Result};
pub use feature::{Beat, Chroma, Feature, FeatureKind, Note, Onset, Value};
pub use onset::OnsetDetector;
pub use provider::{AudioProvider, PcmClip, SourceInfo};
pub use segment::Segmenter;
pub use track::{SharedTrack, Track};
pub use volume::VolumeSampler;
