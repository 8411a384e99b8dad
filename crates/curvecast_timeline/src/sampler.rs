// SPDX-License-Identifier: MIT OR Apache-2.0
//! Uniform offline sampling, the interface boundary for CSV export.

use crate::timeline::{Timeline, TrackSample};

/// Sample every track at a uniform rate over the timeline's duration.
///
/// Produces `floor(duration * rate)` rows at `k / rate`, endpoint excluded,
/// with the rate floored at 1 Hz. Uses the same pure evaluation as telemetry
/// assembly; writing the rows anywhere is the caller's concern.
pub fn sample_uniform(timeline: &Timeline, rate_hz: f64) -> Vec<(f64, Vec<TrackSample>)> {
    let rate = rate_hz.max(1.0);
    let count = ((timeline.duration() * rate).floor() as usize).max(1);

    (0..count)
        .map(|k| {
            let t = k as f64 / rate;
            (t, timeline.sample_at(t))
        })
        .collect()
}
