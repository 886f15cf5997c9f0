//! # RhythmTool
//!
//! Offline audio feature extraction: a streaming pipeline that turns
//! decoded PCM audio into time-stamped features for driving visuals and
//! gameplay - beats, note onsets, prominent pitch classes, segment
//! markers and volume samples.
//!
//! ## Architecture
//!
//! RhythmTool is an umbrella crate that coordinates:
//! - **rhythmtool-dsp** - spectral building blocks (packed real FFT,
//!   windowing, array statistics, mono downmix)
//! - **rhythmtool-analysis** - feature tracks, the per-frame analyzer
//!   contract, the concrete analyzers and the analysis orchestrator
//!
//! ## Quick Start
//!
//! ```no_run
//! use rhythmtool::prelude::*;
//!
//! let mut analyzer = RhythmAnalyzer::default();
//! analyzer.add_analysis(OnsetDetector::new());
//! analyzer.add_analysis(BeatTracker::new());
//! analyzer.add_analysis(VolumeSampler::new());
//!
//! let clip = PcmClip::from_mono(vec![0.0; 44100 * 10], 44100);
//! let data = analyzer.analyze(Box::new(clip), 5.0).unwrap();
//!
//! // Drive the run from the application's main loop.
//! while !analyzer.is_done() {
//!     analyzer.update();
//! }
//!
//! // Query features by time range during playback.
//! let mut beats = Vec::new();
//! data.features::<Beat>(&mut beats, 0.0, 10.0);
//! ```
//!
//! ## Feature Flags
//!
//! - `serialization` - serde derives on features and flat track records
//! - `wav` - load [`PcmClip`]s from WAV files

/// Re-export of rhythmtool-analysis for direct access
pub use rhythmtool_analysis as analysis;
/// Re-export of rhythmtool-dsp for direct access
pub use rhythmtool_dsp as dsp;

pub use rhythmtool_analysis::{
    Analysis, AnalyzerConfig, AnalyzerState, AnyTrack, AudioProvider, Beat, BeatTracker, Chroma,
    Chromagram, Emitter, Error, Feature, FeatureKind, FeatureList, FrameConfig, Note, Onset,
    OnsetDetector, PcmClip, Result, RhythmAnalyzer, RhythmData, Segmenter, SharedTrack,
    SourceInfo, Track, TrackOutput, TrackRecord, Value, VolumeSampler,
};

/// Commonly used types, for glob import.
pub mod prelude {
    pub use rhythmtool_analysis::{
        Analysis, AnalyzerConfig, AnalyzerState, AudioProvider, Beat, BeatTracker, Chroma,
        Chromagram, Feature, FrameConfig, Note, Onset, OnsetDetector, PcmClip, RhythmAnalyzer,
        RhythmData, Segmenter, SharedTrack, SourceInfo, Track, Value, VolumeSampler,
    };
}
