// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe timeline model for CurveCast.
//!
//! This crate provides the data side of the telemetry streamer:
//! - Float tracks with sorted keyframes
//! - Curve evaluation (linear, step, cubic, Bezier)
//! - A playback clock driven by wall-clock time
//! - Edit commands with undo/redo
//! - Uniform offline sampling
//!
//! Evaluation is pure and reads only immutable keyframe data, so it can be
//! called concurrently from any number of readers.

pub mod command;
pub mod keyframe;
pub mod playback;
pub mod sampler;
pub mod timeline;
pub mod track;

pub use command::{CommandError, CommandStack, TimelineCommand};
pub use keyframe::{Handle, Interpolation, InterpolationKind, Keyframe, KeyframeId};
pub use playback::{PlaybackClock, PlaybackStatus, PlayheadSnapshot};
pub use sampler::sample_uniform;
pub use timeline::{Timeline, TrackSample, MIN_DURATION};
pub use track::{Track, TrackId};
