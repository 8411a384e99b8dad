// SPDX-License-Identifier: MIT OR Apache-2.0
//! Telemetry frame assembly and wire encoding.

use curvecast_timeline::{PlayheadSnapshot, Timeline, TrackSample};
use serde::Serialize;
use std::collections::HashMap;

/// Wire protocol version carried in every JSON frame
pub const PROTOCOL_VERSION: &str = "1.0";

/// One assembled telemetry snapshot.
///
/// Constructed fresh per governor cycle and never mutated afterwards; the
/// next cycle's frame simply supersedes it.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryFrame {
    /// Wire protocol version
    pub version: &'static str,
    /// Session token
    pub session_id: String,
    /// Playhead position in integer milliseconds
    pub timestamp_ms: u64,
    /// Monotonic frame counter since play-start
    pub frame_index: u64,
    /// Sampled tracks in track order
    pub tracks: Vec<TrackSample>,
}

/// Sample the timeline at the snapshot position and build a frame.
///
/// Track names are expected to be unique (an editor concern); duplicates are
/// tolerated here by suffixing `#2`, `#3`, ... so wire keys stay distinct.
pub fn assemble(
    timeline: &Timeline,
    snapshot: &PlayheadSnapshot,
    session_id: &str,
) -> TelemetryFrame {
    let mut tracks = timeline.sample_at(snapshot.position);
    disambiguate_names(&mut tracks);

    TelemetryFrame {
        version: PROTOCOL_VERSION,
        session_id: session_id.to_string(),
        timestamp_ms: (snapshot.position * 1000.0).round().max(0.0) as u64,
        frame_index: snapshot.frame_index,
        tracks,
    }
}

fn disambiguate_names(tracks: &mut [TrackSample]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for sample in tracks.iter_mut() {
        let count = seen.entry(sample.name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            sample.name = format!("{}#{count}", sample.name);
        }
    }
}

impl TelemetryFrame {
    /// Encode as a compact JSON document.
    ///
    /// Non-finite values are omitted from the affected track's `values`
    /// array, since JSON has no representation for them.
    pub fn encode_json(&self) -> Vec<u8> {
        let filtered = TelemetryFrame {
            version: self.version,
            session_id: self.session_id.clone(),
            timestamp_ms: self.timestamp_ms,
            frame_index: self.frame_index,
            tracks: self
                .tracks
                .iter()
                .map(|sample| TrackSample {
                    name: sample.name.clone(),
                    values: finite_values(&sample.values),
                })
                .collect(),
        };
        // A frame of plain floats and strings cannot fail to serialize.
        serde_json::to_vec(&filtered).unwrap_or_default()
    }

    /// Encode as headerless little-endian f32 runs, one per track in track
    /// order.
    ///
    /// Consumers must know the per-track value counts out of band. Non-finite
    /// values are skipped, which makes the layout variable for the affected
    /// frame; the same filter keeps this encoding aligned with the JSON one.
    pub fn encode_binary(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.tracks.len() * 4);
        for sample in &self.tracks {
            for value in finite_values(&sample.values) {
                payload.extend_from_slice(&(value as f32).to_le_bytes());
            }
        }
        payload
    }
}

fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_timeline::{InterpolationKind, Keyframe, Track};

    fn snapshot(position: f64, frame_index: u64) -> PlayheadSnapshot {
        PlayheadSnapshot {
            position,
            frame_index,
            playing: true,
        }
    }

    fn demo_timeline() -> Timeline {
        let mut timeline = Timeline::new();
        let mut a = Track::new("camera.fov", InterpolationKind::Linear);
        a.add_keyframe(Keyframe::new(0.0, 60.0));
        a.add_keyframe(Keyframe::new(2.0, 70.0));
        timeline.add_track(a);

        let mut b = Track::new("rig.lift", InterpolationKind::Step);
        b.add_keyframe(Keyframe::new(0.0, 1.5));
        timeline.add_track(b);
        timeline
    }

    #[test]
    fn assemble_builds_expected_json_document() {
        let timeline = demo_timeline();
        let frame = assemble(&timeline, &snapshot(1.0, 33), "fixed");
        let json = String::from_utf8(frame.encode_json()).unwrap();
        assert_eq!(
            json,
            r#"{"version":"1.0","session_id":"fixed","timestamp_ms":1000,"frame_index":33,"tracks":[{"name":"camera.fov","values":[65.0]},{"name":"rig.lift","values":[1.5]}]}"#
        );
    }

    #[test]
    fn timestamp_rounds_position_to_milliseconds() {
        let timeline = demo_timeline();
        let frame = assemble(&timeline, &snapshot(1.3204, 0), "s");
        assert_eq!(frame.timestamp_ms, 1320);
    }

    #[test]
    fn duplicate_track_names_are_suffixed() {
        let mut timeline = Timeline::new();
        for _ in 0..3 {
            let mut track = Track::new("dup", InterpolationKind::Linear);
            track.add_keyframe(Keyframe::new(0.0, 0.0));
            timeline.add_track(track);
        }
        let frame = assemble(&timeline, &snapshot(0.0, 0), "s");
        let names: Vec<&str> = frame.tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["dup", "dup#2", "dup#3"]);
    }

    #[test]
    fn binary_layout_is_little_endian_f32_in_track_order() {
        let timeline = demo_timeline();
        let frame = assemble(&timeline, &snapshot(1.0, 0), "s");
        let payload = frame.encode_binary();
        assert_eq!(payload.len(), 8);
        assert_eq!(&payload[0..4], &65.0_f32.to_le_bytes());
        assert_eq!(&payload[4..8], &1.5_f32.to_le_bytes());
    }

    #[test]
    fn non_finite_values_are_dropped_from_both_encodings() {
        let frame = TelemetryFrame {
            version: PROTOCOL_VERSION,
            session_id: "s".to_string(),
            timestamp_ms: 0,
            frame_index: 0,
            tracks: vec![TrackSample {
                name: "t".to_string(),
                values: vec![1.0, f64::NAN, f64::INFINITY, 2.0],
            }],
        };
        let json = String::from_utf8(frame.encode_json()).unwrap();
        assert!(json.contains(r#""values":[1.0,2.0]"#));
        assert_eq!(frame.encode_binary().len(), 8);
    }

    #[test]
    fn binary_floats_match_flattened_json_values() {
        let timeline = demo_timeline();
        let frame = assemble(&timeline, &snapshot(0.5, 7), "s");

        let parsed: serde_json::Value = serde_json::from_slice(&frame.encode_json()).unwrap();
        let json_floats: Vec<f32> = parsed["tracks"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|t| t["values"].as_array().unwrap().iter())
            .map(|v| v.as_f64().unwrap() as f32)
            .collect();

        let binary = frame.encode_binary();
        let binary_floats: Vec<f32> = binary
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        assert_eq!(json_floats, binary_floats);
    }
}
