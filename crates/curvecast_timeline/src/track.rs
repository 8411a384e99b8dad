// SPDX-License-Identifier: MIT OR Apache-2.0
//! Track definitions and per-track curve evaluation.

use crate::keyframe::{Handle, Interpolation, InterpolationKind, Keyframe, KeyframeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Create a new random track ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

/// A keyframed float track.
///
/// Keyframes are kept sorted by ascending time; every mutating operation
/// restores that ordering, and deserialization re-sorts so file order never
/// matters. Duplicate times are tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TrackData")]
pub struct Track {
    /// Unique track ID
    pub id: TrackId,
    /// Track name, used as the wire-format key
    pub name: String,
    /// Interpolation between keyframes
    pub interpolation: InterpolationKind,
    keyframes: Vec<Keyframe>,
}

/// Raw track fields as they appear in a file
#[derive(Deserialize)]
struct TrackData {
    #[serde(default)]
    id: TrackId,
    name: String,
    #[serde(default)]
    interpolation: InterpolationKind,
    #[serde(default)]
    keyframes: Vec<Keyframe>,
}

impl From<TrackData> for Track {
    fn from(data: TrackData) -> Self {
        let mut track = Self {
            id: data.id,
            name: data.name,
            interpolation: data.interpolation,
            keyframes: data.keyframes,
        };
        track.sort_keyframes();
        track
    }
}

impl Track {
    /// Create a new empty track
    pub fn new(name: impl Into<String>, interpolation: InterpolationKind) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            interpolation,
            keyframes: Vec::new(),
        }
    }

    /// Add a keyframe, returning its ID
    pub fn add_keyframe(&mut self, keyframe: Keyframe) -> KeyframeId {
        let id = keyframe.id;
        self.keyframes.push(keyframe);
        self.sort_keyframes();
        id
    }

    /// Remove a keyframe, returning it if it existed
    pub fn remove_keyframe(&mut self, keyframe_id: KeyframeId) -> Option<Keyframe> {
        let idx = self.keyframes.iter().position(|k| k.id == keyframe_id)?;
        Some(self.keyframes.remove(idx))
    }

    /// Move a keyframe to a new time and value
    pub fn move_keyframe(&mut self, keyframe_id: KeyframeId, time: f64, value: f64) -> bool {
        let Some(kf) = self.keyframes.iter_mut().find(|k| k.id == keyframe_id) else {
            return false;
        };
        kf.time = time.max(0.0);
        kf.value = value;
        self.sort_keyframes();
        true
    }

    /// Get keyframe by ID
    pub fn keyframe(&self, keyframe_id: KeyframeId) -> Option<&Keyframe> {
        self.keyframes.iter().find(|k| k.id == keyframe_id)
    }

    /// Get mutable keyframe by ID
    pub fn keyframe_mut(&mut self, keyframe_id: KeyframeId) -> Option<&mut Keyframe> {
        self.keyframes.iter_mut().find(|k| k.id == keyframe_id)
    }

    /// Get the keyframe at `time`, if one sits within an epsilon of it
    pub fn keyframe_at(&self, time: f64) -> Option<&Keyframe> {
        self.keyframes.iter().find(|k| (k.time - time).abs() < 1e-3)
    }

    /// Time of the last keyframe
    pub fn content_duration(&self) -> f64 {
        self.keyframes.last().map(|k| k.time).unwrap_or(0.0)
    }

    /// Get all keyframes, sorted by time
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Get keyframe count
    pub fn keyframe_count(&self) -> usize {
        self.keyframes.len()
    }

    fn sort_keyframes(&mut self) {
        self.keyframes
            .sort_by(|a, b| a.time.total_cmp(&b.time).then(a.value.total_cmp(&b.value)));
    }

    /// Evaluate the track at time `t`.
    ///
    /// An empty track evaluates to 0.0. Outside the keyed range the boundary
    /// keyframe's value is returned unchanged (clamp, no extrapolation).
    /// Pure and `&self`-only, so it is safe to call from concurrent readers.
    pub fn evaluate(&self, t: f64) -> f64 {
        let keys = &self.keyframes;
        let Some(first) = keys.first() else {
            return 0.0;
        };
        if t <= first.time {
            return first.value;
        }
        let last = &keys[keys.len() - 1];
        if t >= last.time {
            return last.value;
        }

        // Bracketing pair: k0.time <= t < k1.time
        let idx = keys
            .iter()
            .position(|k| k.time > t)
            .unwrap_or(keys.len() - 1);
        let k0 = &keys[idx - 1];
        let k1 = &keys[idx];
        let dt = k1.time - k0.time;
        let u = (t - k0.time) / dt;

        match self.interpolation {
            InterpolationKind::Step => k0.value,
            InterpolationKind::Linear => Interpolation::lerp(k0.value, k1.value, u),
            InterpolationKind::Cubic => {
                let before = idx.checked_sub(2).map(|i| &keys[i]);
                let after = keys.get(idx + 1);
                catmull_rom(before, k0, k1, after, u)
            }
            InterpolationKind::Bezier => bezier_segment(k0, k1, dt, u),
        }
    }
}

/// Catmull-Rom segment between `k0` and `k1` with finite-difference tangents
/// through the outer neighbors; one-sided tangents at the sequence ends keep
/// the curve C1 at every interior keyframe.
fn catmull_rom(
    before: Option<&Keyframe>,
    k0: &Keyframe,
    k1: &Keyframe,
    after: Option<&Keyframe>,
    u: f64,
) -> f64 {
    let dt = k1.time - k0.time;

    let m0 = match before {
        Some(b) if k1.time > b.time => (k1.value - b.value) / (k1.time - b.time),
        _ => (k1.value - k0.value) / dt,
    };
    let m1 = match after {
        Some(a) if a.time > k0.time => (a.value - k0.value) / (a.time - k0.time),
        _ => (k1.value - k0.value) / dt,
    };

    // Hermite tangents are per unit of u, so scale the slopes by dt.
    Interpolation::hermite(k0.value, m0 * dt, k1.value, m1 * dt, u)
}

/// Cubic Bezier segment in time-value space.
///
/// Handle time offsets are clamped into the segment so time stays monotonic
/// and the curve remains single-valued; the parameter for the query time is
/// then recovered on the time axis rather than taken from `u` directly.
/// Missing handles default to one third of the segment, which reduces the
/// curve to the linear segment.
fn bezier_segment(k0: &Keyframe, k1: &Keyframe, dt: f64, u: f64) -> f64 {
    let out = k0.out_handle.unwrap_or(Handle::new(dt / 3.0, (k1.value - k0.value) / 3.0));
    let inn = k1.in_handle.unwrap_or(Handle::new(-dt / 3.0, (k0.value - k1.value) / 3.0));

    // Normalized time axis: endpoints 0 and 1, inner control points clamped.
    let x1 = (out.time / dt).clamp(0.0, 1.0);
    let x2 = (1.0 + inn.time / dt).clamp(0.0, 1.0);

    let y0 = k0.value;
    let y1 = k0.value + out.value;
    let y2 = k1.value + inn.value;
    let y3 = k1.value;

    let s = Interpolation::solve_bezier_time(x1, x2, u);
    Interpolation::bezier(y0, y1, y2, y3, s)
}
