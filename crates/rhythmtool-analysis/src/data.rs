//! Aggregated analysis results.
//!
//! [`RhythmData`] owns the tracks produced by one analysis run. Tracks
//! are live shared objects: while a run is in progress they keep growing,
//! and readers polling them tolerate features appearing at drain
//! granularity. Lookups are typed through the [`Feature`] registry;
//! multiple tracks of the same feature type may coexist and lookups
//! return the first match unless all matches are requested.

use crate::feature::{Beat, Chroma, Feature, FeatureKind, Onset, Value};
use crate::provider::SourceInfo;
use crate::track::{SharedTrack, Track};

/// A typed shared track behind one heterogeneous holder.
#[derive(Debug, Clone)]
pub enum AnyTrack {
    Beats(SharedTrack<Beat>),
    Onsets(SharedTrack<Onset>),
    Chroma(SharedTrack<Chroma>),
    Values(SharedTrack<Value>),
}

impl AnyTrack {
    /// The feature kind stored in this track.
    pub fn kind(&self) -> FeatureKind {
        match self {
            AnyTrack::Beats(_) => FeatureKind::Beat,
            AnyTrack::Onsets(_) => FeatureKind::Onset,
            AnyTrack::Chroma(_) => FeatureKind::Chroma,
            AnyTrack::Values(_) => FeatureKind::Value,
        }
    }

    /// The name of the track.
    pub fn name(&self) -> String {
        match self {
            AnyTrack::Beats(track) => track.name(),
            AnyTrack::Onsets(track) => track.name(),
            AnyTrack::Chroma(track) => track.name(),
            AnyTrack::Values(track) => track.name(),
        }
    }

    /// The number of features currently in the track.
    pub fn len(&self) -> usize {
        match self {
            AnyTrack::Beats(track) => track.read().len(),
            AnyTrack::Onsets(track) => track.read().len(),
            AnyTrack::Chroma(track) => track.read().len(),
            AnyTrack::Values(track) => track.read().len(),
        }
    }

    /// Whether the track is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_record(&self) -> TrackRecord {
        match self {
            AnyTrack::Beats(track) => {
                let track = track.read();
                TrackRecord {
                    name: track.name().to_owned(),
                    features: FeatureList::Beats(track.features().to_vec()),
                }
            }
            AnyTrack::Onsets(track) => {
                let track = track.read();
                TrackRecord {
                    name: track.name().to_owned(),
                    features: FeatureList::Onsets(track.features().to_vec()),
                }
            }
            AnyTrack::Chroma(track) => {
                let track = track.read();
                TrackRecord {
                    name: track.name().to_owned(),
                    features: FeatureList::Chroma(track.features().to_vec()),
                }
            }
            AnyTrack::Values(track) => {
                let track = track.read();
                TrackRecord {
                    name: track.name().to_owned(),
                    features: FeatureList::Values(track.features().to_vec()),
                }
            }
        }
    }
}

/// Flat persisted form of one track: its name and a per-kind feature
/// array. This is the shape asset-serialization layers store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TrackRecord {
    pub name: String,
    pub features: FeatureList,
}

/// Feature array of one concrete kind.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum FeatureList {
    Beats(Vec<Beat>),
    Onsets(Vec<Onset>),
    Chroma(Vec<Chroma>),
    Values(Vec<Value>),
}

impl FeatureList {
    /// The feature kind held in this list.
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureList::Beats(_) => FeatureKind::Beat,
            FeatureList::Onsets(_) => FeatureKind::Onset,
            FeatureList::Chroma(_) => FeatureKind::Chroma,
            FeatureList::Values(_) => FeatureKind::Value,
        }
    }

    /// The number of features in the list.
    pub fn len(&self) -> usize {
        match self {
            FeatureList::Beats(features) => features.len(),
            FeatureList::Onsets(features) => features.len(),
            FeatureList::Chroma(features) => features.len(),
            FeatureList::Values(features) => features.len(),
        }
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Analysis results for one audio source, stored as tracks.
#[derive(Debug, Clone)]
pub struct RhythmData {
    source: SourceInfo,
    tracks: Vec<AnyTrack>,
}

impl RhythmData {
    /// Create a result aggregate for an audio source.
    pub fn new(source: SourceInfo, tracks: Vec<AnyTrack>) -> Self {
        Self { source, tracks }
    }

    /// Information about the analyzed audio source.
    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// All tracks, in registration order.
    pub fn tracks(&self) -> &[AnyTrack] {
        &self.tracks
    }

    /// The first track that stores features of type `T`.
    pub fn track<T: Feature>(&self) -> Option<SharedTrack<T>> {
        self.tracks.iter().find_map(|t| T::match_track(t).cloned())
    }

    /// The first track that stores features of type `T` under `name`.
    pub fn track_named<T: Feature>(&self, name: &str) -> Option<SharedTrack<T>> {
        self.tracks
            .iter()
            .filter(|t| t.name() == name)
            .find_map(|t| T::match_track(t).cloned())
    }

    /// All tracks that store features of type `T`.
    pub fn tracks_of<T: Feature>(&self) -> Vec<SharedTrack<T>> {
        self.tracks
            .iter()
            .filter_map(|t| T::match_track(t).cloned())
            .collect()
    }

    /// All tracks that store features of type `T` under `name`.
    pub fn tracks_of_named<T: Feature>(&self, name: &str) -> Vec<SharedTrack<T>> {
        self.tracks
            .iter()
            .filter(|t| t.name() == name)
            .filter_map(|t| T::match_track(t).cloned())
            .collect()
    }

    /// Append all features of type `T` with `start <= timestamp < end`
    /// to `out`, across every matching track.
    pub fn features<T: Feature>(&self, out: &mut Vec<T>, start: f32, end: f32) {
        for track in &self.tracks {
            if let Some(track) = T::match_track(track) {
                track.read().features_in(out, start, end);
            }
        }
    }

    /// Like [`RhythmData::features`], restricted to tracks named `name`.
    pub fn features_named<T: Feature>(&self, out: &mut Vec<T>, start: f32, end: f32, name: &str) {
        for track in &self.tracks {
            if track.name() != name {
                continue;
            }

            if let Some(track) = T::match_track(track) {
                track.read().features_in(out, start, end);
            }
        }
    }

    /// Append all features of type `T` overlapping `[start, end)` to
    /// `out`, including features that start earlier but whose length
    /// reaches into the window.
    pub fn intersecting_features<T: Feature>(&self, out: &mut Vec<T>, start: f32, end: f32) {
        for track in &self.tracks {
            if let Some(track) = T::match_track(track) {
                track.read().intersecting_features(out, start, end);
            }
        }
    }

    /// Like [`RhythmData::intersecting_features`], restricted to tracks
    /// named `name`.
    pub fn intersecting_features_named<T: Feature>(
        &self,
        out: &mut Vec<T>,
        start: f32,
        end: f32,
        name: &str,
    ) {
        for track in &self.tracks {
            if track.name() != name {
                continue;
            }

            if let Some(track) = T::match_track(track) {
                track.read().intersecting_features(out, start, end);
            }
        }
    }

    /// Destructure to the flat persisted form.
    pub fn to_records(&self) -> Vec<TrackRecord> {
        self.tracks.iter().map(AnyTrack::to_record).collect()
    }

    /// Rebuild an aggregate from the flat persisted form.
    pub fn from_records(source: SourceInfo, records: Vec<TrackRecord>) -> Self {
        let tracks = records
            .into_iter()
            .map(|record| match record.features {
                FeatureList::Beats(features) => Beat::wrap_track(SharedTrack::new(
                    Track::from_features(record.name, features),
                )),
                FeatureList::Onsets(features) => Onset::wrap_track(SharedTrack::new(
                    Track::from_features(record.name, features),
                )),
                FeatureList::Chroma(features) => Chroma::wrap_track(SharedTrack::new(
                    Track::from_features(record.name, features),
                )),
                FeatureList::Values(features) => Value::wrap_track(SharedTrack::new(
                    Track::from_features(record.name, features),
                )),
            })
            .collect();

        Self { source, tracks }
    }
}
