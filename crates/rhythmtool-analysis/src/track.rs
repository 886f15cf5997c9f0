//! Time-ordered feature sequences.
//!
//! A [`Track`] keeps its features sorted by timestamp at all times and
//! answers range queries with binary search. Repeated "what intersects a
//! moving window" queries from playback consumers are accelerated by a
//! bucket cache that remembers, per 5-second stretch of the timeline, the
//! first feature whose interval reaches into it.

use crate::feature::Feature;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

/// Width in seconds of one cache bucket.
const BUCKET_SECONDS: f32 = 5.0;

/// A collection of features of one type, ordered by timestamp.
#[derive(Debug)]
pub struct Track<T: Feature> {
    name: String,
    features: Vec<T>,
    cache: Mutex<TrackCache>,
}

#[derive(Debug, Default)]
struct TrackCache {
    /// Sorted bucket start times that have a cached entry.
    buckets: Vec<i32>,
    /// First index of a feature whose interval reaches into the bucket.
    indices: HashMap<i32, usize>,
}

impl<T: Feature> Track<T> {
    /// Create an empty track.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
            cache: Mutex::new(TrackCache::default()),
        }
    }

    /// Create a track from existing features, sorting them by timestamp.
    pub fn from_features(name: impl Into<String>, mut features: Vec<T>) -> Self {
        features.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

        Self {
            name: name.into(),
            features,
            cache: Mutex::new(TrackCache::default()),
        }
    }

    /// The name of the track.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of features in the track.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the track holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The features, in timestamp order.
    pub fn features(&self) -> &[T] {
        &self.features
    }

    /// Get a feature by index.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.features.get(index)
    }

    /// Add a feature, keeping the track sorted.
    pub fn add(&mut self, feature: T) {
        let append = self
            .features
            .last()
            .map_or(true, |last| feature.timestamp() > last.timestamp());

        if append {
            self.features.push(feature);
            return;
        }

        let index = self.index_of(feature.timestamp());
        self.features.insert(index, feature);
        self.clear_cache(feature.timestamp());
    }

    /// Remove the first feature equal to `feature`. Returns whether a
    /// feature was removed.
    pub fn remove(&mut self, feature: &T) -> bool {
        match self.index_of_feature(feature) {
            Some(index) => {
                self.features.remove(index);
                self.clear_cache(feature.timestamp());
                true
            }
            None => false,
        }
    }

    /// Re-sort the features. Use this after changing feature timestamps
    /// through [`Track::features_mut`].
    pub fn sort(&mut self) {
        self.features
            .sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

        let mut cache = self.cache.lock();
        cache.buckets.clear();
        cache.indices.clear();
    }

    /// Mutable access to the features for bulk edits. The caller must
    /// call [`Track::sort`] afterwards to restore the track invariants.
    pub fn features_mut(&mut self) -> &mut [T] {
        &mut self.features
    }

    /// Append all features with `start <= timestamp < end` to `out`.
    pub fn features_in(&self, out: &mut Vec<T>, start: f32, end: f32) {
        let start_index = self.index_of(start);
        let end_index = self.index_of(end).max(start_index);

        out.extend_from_slice(&self.features[start_index..end_index]);
    }

    /// Append all features overlapping `[start, end)` to `out`,
    /// including features that start earlier but whose length reaches
    /// past `start`.
    pub fn intersecting_features(&self, out: &mut Vec<T>, start: f32, end: f32) {
        let start_index = self.intersecting_index(start);
        let end_index = self.index_of(end).max(start_index);

        for feature in &self.features[start_index..end_index] {
            if feature.timestamp() + feature.length() > start {
                out.push(*feature);
            }
        }
    }

    /// Index of the first feature with `timestamp >=` the query. Equal
    /// timestamps resolve to the first feature of the run.
    pub fn index_of(&self, timestamp: f32) -> usize {
        self.features
            .partition_point(|f| f.timestamp() < timestamp)
    }

    /// Index of the first feature equal to `feature`, if present.
    pub fn index_of_feature(&self, feature: &T) -> Option<usize> {
        let start = self.index_of(feature.timestamp());

        for (offset, candidate) in self.features[start..].iter().enumerate() {
            if candidate == feature {
                return Some(start + offset);
            }

            if candidate.timestamp() > feature.timestamp() {
                break;
            }
        }

        None
    }

    /// Index of the first feature whose interval reaches past
    /// `timestamp`, accounting for feature lengths.
    pub fn intersecting_index(&self, timestamp: f32) -> usize {
        let mut cache = self.cache.lock();
        let index = self.cache_index(&mut cache, timestamp);

        if index == cache.buckets.len() {
            return self.features.len();
        }

        let cached = cache.indices[&cache.buckets[index]];
        drop(cache);

        for (offset, feature) in self.features[cached..].iter().enumerate() {
            if feature.timestamp() + feature.length() > timestamp {
                return cached + offset;
            }
        }

        self.features.len()
    }

    /// Bucket position for `timestamp`, probing and caching the bucket's
    /// first intersecting feature on a miss.
    fn cache_index(&self, cache: &mut TrackCache, timestamp: f32) -> usize {
        let bucket = Self::bucket(timestamp);

        match cache.buckets.binary_search(&bucket) {
            Ok(index) => index,
            Err(index) => {
                let mut scan = 0;

                if index > 0 {
                    scan = cache.indices[&cache.buckets[index - 1]];
                }

                for (offset, feature) in self.features[scan..].iter().enumerate() {
                    if feature.timestamp() + feature.length() > bucket as f32 {
                        cache.buckets.insert(index, bucket);
                        cache.indices.insert(bucket, scan + offset);
                        return index;
                    }
                }

                index
            }
        }
    }

    /// Drop cached buckets from the mutated timestamp forward.
    fn clear_cache(&mut self, timestamp: f32) {
        let bucket = Self::bucket(timestamp);
        let cache = self.cache.get_mut();
        let index = cache.buckets.partition_point(|&b| b < bucket);

        for bucket in cache.buckets.drain(index..) {
            cache.indices.remove(&bucket);
        }
    }

    fn bucket(timestamp: f32) -> i32 {
        (timestamp / BUCKET_SECONDS).floor() as i32 * BUCKET_SECONDS as i32
    }
}

impl<T: Feature> Index<usize> for Track<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.features[index]
    }
}

/// A track shared between the analysis pipeline and its readers.
///
/// Single writer (the orchestrator's drain point), any number of readers;
/// readers polling during an in-progress analysis see features appear at
/// drain granularity.
#[derive(Debug)]
pub struct SharedTrack<T: Feature>(Arc<RwLock<Track<T>>>);

impl<T: Feature> Clone for SharedTrack<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Feature> SharedTrack<T> {
    pub fn new(track: Track<T>) -> Self {
        Self(Arc::new(RwLock::new(track)))
    }

    /// Lock the track for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Track<T>> {
        self.0.read()
    }

    /// Lock the track for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Track<T>> {
        self.0.write()
    }

    /// The name of the track.
    pub fn name(&self) -> String {
        self.0.read().name().to_owned()
    }
}
