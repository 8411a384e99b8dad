// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edit commands over the timeline with an undo/redo stack.
//!
//! Commands are tagged variants applied through [`CommandStack`], which
//! records the inverse data needed to walk history in both directions.

use crate::keyframe::{InterpolationKind, Keyframe, KeyframeId};
use crate::timeline::Timeline;
use crate::track::TrackId;
use std::collections::VecDeque;
use thiserror::Error;

/// Default undo history depth
const MAX_HISTORY: usize = 100;

/// Command errors
#[derive(Debug, Error)]
pub enum CommandError {
    /// Referenced track does not exist
    #[error("track not found: {0:?}")]
    TrackNotFound(TrackId),

    /// Referenced keyframe does not exist
    #[error("keyframe not found: {0:?}")]
    KeyframeNotFound(KeyframeId),

    /// Undo stack is empty
    #[error("nothing to undo")]
    NothingToUndo,

    /// Redo stack is empty
    #[error("nothing to redo")]
    NothingToRedo,
}

/// An edit operation on the timeline
#[derive(Debug, Clone)]
pub enum TimelineCommand {
    /// Insert a new keyframe
    AddKeyframe {
        /// Target track
        track: TrackId,
        /// Keyframe time in seconds
        time: f64,
        /// Keyframe value
        value: f64,
    },
    /// Remove an existing keyframe
    DeleteKeyframe {
        /// Target track
        track: TrackId,
        /// Keyframe to remove
        key: KeyframeId,
    },
    /// Move a keyframe to a new time and value
    MoveKeyframe {
        /// Target track
        track: TrackId,
        /// Keyframe to move
        key: KeyframeId,
        /// New time in seconds
        time: f64,
        /// New value
        value: f64,
    },
    /// Change a track's interpolation kind
    SetInterpolation {
        /// Target track
        track: TrackId,
        /// New interpolation kind
        kind: InterpolationKind,
    },
}

/// A command together with the inverse data captured when it was applied.
/// Deleted keyframes keep their original ids so later history entries that
/// reference them stay valid across undo/redo.
#[derive(Debug, Clone)]
enum AppliedCommand {
    AddKeyframe { track: TrackId, key: Keyframe },
    DeleteKeyframe { track: TrackId, key: Keyframe },
    MoveKeyframe {
        track: TrackId,
        key: KeyframeId,
        before: (f64, f64),
        after: (f64, f64),
    },
    SetInterpolation {
        track: TrackId,
        before: InterpolationKind,
        after: InterpolationKind,
    },
}

/// Undo/redo stack of applied timeline commands
#[derive(Debug, Default)]
pub struct CommandStack {
    undo: VecDeque<AppliedCommand>,
    redo: VecDeque<AppliedCommand>,
    max_depth: usize,
}

impl CommandStack {
    /// Create a stack with the default history depth
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Create a stack with a custom history depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Apply a command to the timeline and push it onto the undo stack.
    /// Any pending redo history is discarded.
    pub fn apply(
        &mut self,
        timeline: &mut Timeline,
        command: TimelineCommand,
    ) -> Result<(), CommandError> {
        let applied = match command {
            TimelineCommand::AddKeyframe { track, time, value } => {
                let t = timeline
                    .track_mut(track)
                    .ok_or(CommandError::TrackNotFound(track))?;
                let keyframe = Keyframe::new(time.max(0.0), value);
                let snapshot = keyframe.clone();
                t.add_keyframe(keyframe);
                AppliedCommand::AddKeyframe {
                    track,
                    key: snapshot,
                }
            }
            TimelineCommand::DeleteKeyframe { track, key } => {
                let t = timeline
                    .track_mut(track)
                    .ok_or(CommandError::TrackNotFound(track))?;
                let removed = t
                    .remove_keyframe(key)
                    .ok_or(CommandError::KeyframeNotFound(key))?;
                AppliedCommand::DeleteKeyframe {
                    track,
                    key: removed,
                }
            }
            TimelineCommand::MoveKeyframe {
                track,
                key,
                time,
                value,
            } => {
                let t = timeline
                    .track_mut(track)
                    .ok_or(CommandError::TrackNotFound(track))?;
                let before = t
                    .keyframe(key)
                    .map(|k| (k.time, k.value))
                    .ok_or(CommandError::KeyframeNotFound(key))?;
                t.move_keyframe(key, time, value);
                let after = (time.max(0.0), value);
                AppliedCommand::MoveKeyframe {
                    track,
                    key,
                    before,
                    after,
                }
            }
            TimelineCommand::SetInterpolation { track, kind } => {
                let t = timeline
                    .track_mut(track)
                    .ok_or(CommandError::TrackNotFound(track))?;
                let before = t.interpolation;
                t.interpolation = kind;
                AppliedCommand::SetInterpolation {
                    track,
                    before,
                    after: kind,
                }
            }
        };

        self.redo.clear();
        self.undo.push_back(applied);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
        Ok(())
    }

    /// Undo the most recent command
    pub fn undo(&mut self, timeline: &mut Timeline) -> Result<(), CommandError> {
        let applied = self.undo.pop_back().ok_or(CommandError::NothingToUndo)?;
        Self::revert(timeline, &applied)?;
        self.redo.push_back(applied);
        Ok(())
    }

    /// Redo the most recently undone command
    pub fn redo(&mut self, timeline: &mut Timeline) -> Result<(), CommandError> {
        let applied = self.redo.pop_back().ok_or(CommandError::NothingToRedo)?;
        Self::reapply(timeline, &applied)?;
        self.undo.push_back(applied);
        Ok(())
    }

    /// Whether an undo step is available
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether a redo step is available
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Drop all history
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    fn revert(timeline: &mut Timeline, applied: &AppliedCommand) -> Result<(), CommandError> {
        match applied {
            AppliedCommand::AddKeyframe { track, key } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                t.remove_keyframe(key.id)
                    .ok_or(CommandError::KeyframeNotFound(key.id))?;
            }
            AppliedCommand::DeleteKeyframe { track, key } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                t.add_keyframe(key.clone());
            }
            AppliedCommand::MoveKeyframe {
                track, key, before, ..
            } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                if !t.move_keyframe(*key, before.0, before.1) {
                    return Err(CommandError::KeyframeNotFound(*key));
                }
            }
            AppliedCommand::SetInterpolation { track, before, .. } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                t.interpolation = *before;
            }
        }
        Ok(())
    }

    fn reapply(timeline: &mut Timeline, applied: &AppliedCommand) -> Result<(), CommandError> {
        match applied {
            AppliedCommand::AddKeyframe { track, key } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                t.add_keyframe(key.clone());
            }
            AppliedCommand::DeleteKeyframe { track, key } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                t.remove_keyframe(key.id)
                    .ok_or(CommandError::KeyframeNotFound(key.id))?;
            }
            AppliedCommand::MoveKeyframe {
                track, key, after, ..
            } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                if !t.move_keyframe(*key, after.0, after.1) {
                    return Err(CommandError::KeyframeNotFound(*key));
                }
            }
            AppliedCommand::SetInterpolation { track, after, .. } => {
                let t = timeline
                    .track_mut(*track)
                    .ok_or(CommandError::TrackNotFound(*track))?;
                t.interpolation = *after;
            }
        }
        Ok(())
    }
}
