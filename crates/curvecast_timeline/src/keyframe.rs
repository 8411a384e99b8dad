// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe definitions and curve interpolation primitives.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyframeId(pub Uuid);

impl KeyframeId {
    /// Create a new random keyframe ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyframeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpolation applied between a track's keyframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationKind {
    /// Straight segments between neighboring keyframes
    #[default]
    Linear,
    /// Hold the previous keyframe's value until the next one
    Step,
    /// Catmull-Rom smoothing through neighboring keyframes
    Cubic,
    /// Cubic Bezier shaped by per-keyframe handles
    Bezier,
}

/// Tangent handle attached to a keyframe, as a time/value offset.
///
/// Handles are only consulted when the owning track interpolates with
/// [`InterpolationKind::Bezier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Handle {
    /// Time offset in seconds relative to the keyframe
    pub time: f64,
    /// Value offset relative to the keyframe
    pub value: f64,
}

impl Handle {
    /// Create a new handle offset
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// A keyframe on a track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyframe {
    /// Unique keyframe ID; generated when absent from a file
    #[serde(default)]
    pub id: KeyframeId,
    /// Time in seconds
    pub time: f64,
    /// Value at this keyframe
    pub value: f64,
    /// Incoming Bezier handle (points back toward the previous keyframe)
    #[serde(default)]
    pub in_handle: Option<Handle>,
    /// Outgoing Bezier handle (points toward the next keyframe)
    #[serde(default)]
    pub out_handle: Option<Handle>,
}

impl Keyframe {
    /// Create a new keyframe
    pub fn new(time: f64, value: f64) -> Self {
        Self {
            id: KeyframeId::new(),
            time,
            value,
            in_handle: None,
            out_handle: None,
        }
    }

    /// Attach Bezier handles
    pub fn with_handles(mut self, in_handle: Handle, out_handle: Handle) -> Self {
        self.in_handle = Some(in_handle);
        self.out_handle = Some(out_handle);
        self
    }
}

/// Interpolation utilities
pub struct Interpolation;

impl Interpolation {
    /// Linear interpolation between two values
    pub fn lerp(a: f64, b: f64, u: f64) -> f64 {
        a + (b - a) * u
    }

    /// Hermite spline interpolation with tangents expressed per unit of `u`
    pub fn hermite(p0: f64, m0: f64, p1: f64, m1: f64, u: f64) -> f64 {
        let u2 = u * u;
        let u3 = u2 * u;

        let h00 = 2.0 * u3 - 3.0 * u2 + 1.0;
        let h10 = u3 - 2.0 * u2 + u;
        let h01 = -2.0 * u3 + 3.0 * u2;
        let h11 = u3 - u2;

        h00 * p0 + h10 * m0 + h01 * p1 + h11 * m1
    }

    /// Evaluate a cubic Bezier polynomial at parameter `s`
    pub fn bezier(p0: f64, p1: f64, p2: f64, p3: f64, s: f64) -> f64 {
        let s2 = s * s;
        let s3 = s2 * s;
        let ms = 1.0 - s;
        let ms2 = ms * ms;
        let ms3 = ms2 * ms;

        p0 * ms3 + 3.0 * p1 * ms2 * s + 3.0 * p2 * ms * s2 + p3 * s3
    }

    /// Derivative of the cubic Bezier polynomial at parameter `s`
    pub fn bezier_derivative(p0: f64, p1: f64, p2: f64, p3: f64, s: f64) -> f64 {
        let ms = 1.0 - s;
        3.0 * ms * ms * (p1 - p0) + 6.0 * ms * s * (p2 - p1) + 3.0 * s * s * (p3 - p2)
    }

    /// Solve a time-axis Bezier with endpoints 0 and 1 for the parameter
    /// reaching `target`.
    ///
    /// `x1` and `x2` are the inner control points on the normalized time
    /// axis and must lie in `[0, 1]` so the mapping stays monotonic.
    /// Newton-Raphson with a bisection fallback for flat derivatives.
    pub fn solve_bezier_time(x1: f64, x2: f64, target: f64) -> f64 {
        let mut s = target.clamp(0.0, 1.0);

        for _ in 0..8 {
            let x = Self::bezier(0.0, x1, x2, 1.0, s) - target;
            if x.abs() < 1e-9 {
                return s;
            }
            let dx = Self::bezier_derivative(0.0, x1, x2, 1.0, s);
            if dx.abs() < 1e-12 {
                break;
            }
            s = (s - x / dx).clamp(0.0, 1.0);
        }

        // Bisection fallback
        let mut lo = 0.0_f64;
        let mut hi = 1.0_f64;
        s = target.clamp(0.0, 1.0);
        for _ in 0..32 {
            let x = Self::bezier(0.0, x1, x2, 1.0, s);
            if (x - target).abs() < 1e-9 {
                return s;
            }
            if x < target {
                lo = s;
            } else {
                hi = s;
            }
            s = (lo + hi) * 0.5;
        }
        s
    }
}
