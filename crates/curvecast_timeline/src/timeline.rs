// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline containing multiple tracks.

use crate::track::{Track, TrackId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Smallest accepted timeline duration, in seconds
pub const MIN_DURATION: f64 = 0.001;

/// One track's sampled values at a query time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    /// Track name
    pub name: String,
    /// Sampled values
    pub values: Vec<f64>,
}

/// A timeline of float tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    tracks: IndexMap<TrackId, Track>,
    duration: f64,
    /// Advisory rate for offline sampling (CSV export), not telemetry
    pub sample_rate: f64,
}

impl Timeline {
    /// Create a new empty timeline with the default duration
    pub fn new() -> Self {
        Self {
            tracks: IndexMap::new(),
            duration: 10.0,
            sample_rate: 90.0,
        }
    }

    /// Add a track
    pub fn add_track(&mut self, track: Track) -> TrackId {
        let id = track.id;
        self.tracks.insert(id, track);
        id
    }

    /// Remove a track
    pub fn remove_track(&mut self, track_id: TrackId) -> Option<Track> {
        self.tracks.shift_remove(&track_id)
    }

    /// Get a track
    pub fn track(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    /// Get a mutable track
    pub fn track_mut(&mut self, track_id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&track_id)
    }

    /// Iterate tracks in insertion order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Get track count
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Timeline duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Set the duration, floored at [`MIN_DURATION`]
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(MIN_DURATION);
    }

    /// Latest keyframe time across all tracks
    pub fn content_duration(&self) -> f64 {
        self.tracks
            .values()
            .map(Track::content_duration)
            .fold(0.0, f64::max)
    }

    /// Sample every track at time `t`.
    ///
    /// `t` is clamped into `[0, duration]` first, which also tolerates
    /// keyframes sitting past the configured duration. One entry per track,
    /// in track order. Pure; safe for concurrent readers.
    pub fn sample_at(&self, t: f64) -> Vec<TrackSample> {
        // max(0.0) also shields against a non-positive duration smuggled in
        // through deserialization.
        let t = t.clamp(0.0, self.duration.max(0.0));
        self.tracks
            .values()
            .map(|track| TrackSample {
                name: track.name.clone(),
                values: vec![track.evaluate(t)],
            })
            .collect()
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
