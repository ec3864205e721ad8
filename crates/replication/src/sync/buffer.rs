use std::collections::VecDeque;

use glam::{DQuat, DVec3};

use crate::net::protocol::{TransformEvent, TransformFrame};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: DVec3,
    pub rotation: DQuat,
}

/// Result of sampling a buffer at one playback time. `pose` is present only
/// while the buffer is interpolating and the sample falls inside the active
/// pair; `event` surfaces the front frame's discrete transition the first
/// time its pair becomes active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackUpdate {
    pub pose: Option<Pose>,
    pub event: Option<TransformEvent>,
}

/// Per-entity playback buffer. Frames are appended in arrival order and
/// retired from the front once playback time passes them; the buffer itself
/// never re-sorts (ordering is trusted from the transport).
///
/// With fewer than two frames the buffer is buffering: nothing is emitted
/// and the presentation keeps whatever pose it last applied. When playback
/// time outruns the newest frame with no successor received, the buffer
/// drains and freezes the same way; no extrapolation is attempted.
#[derive(Debug, Default)]
pub struct InterpolationBuffer {
    frames: VecDeque<TransformFrame>,
    pair_event_applied: bool,
}

impl InterpolationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: TransformFrame) {
        self.frames.push_back(frame);
    }

    pub fn extend(&mut self, frames: impl IntoIterator<Item = TransformFrame>) {
        self.frames.extend(frames);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_interpolating(&self) -> bool {
        self.frames.len() >= 2
    }

    /// Most recent buffered capture time, scanned rather than taken from the
    /// back so a misordered stream cannot understate the lag estimate.
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.frames
            .iter()
            .map(|f| f.timestamp)
            .fold(None, |acc, t| Some(acc.map_or(t, |m: f64| m.max(t))))
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.pair_event_applied = false;
    }

    /// Samples the pose at `playback_time` against the front pair, then
    /// retires the front frame once playback has passed the pair's end.
    /// At most one frame is retired per call so every pair gets its turn as
    /// the active pair and no transition event is skipped.
    pub fn sample(&mut self, playback_time: f64) -> PlaybackUpdate {
        if self.frames.len() < 2 {
            return PlaybackUpdate {
                pose: None,
                event: None,
            };
        }

        let event = if self.pair_event_applied {
            None
        } else {
            self.pair_event_applied = true;
            match self.frames[0].event() {
                TransformEvent::None => None,
                event => Some(event),
            }
        };

        let from = self.frames[0];
        let to = self.frames[1];

        let pose = if playback_time < to.timestamp {
            let span = to.timestamp - from.timestamp;
            let t = if span > 0.0 {
                ((playback_time - from.timestamp) / span).clamp(0.0, 1.0)
            } else {
                0.0
            };
            Some(interpolate(&from, &to, t))
        } else {
            None
        };

        if playback_time >= to.timestamp {
            self.frames.pop_front();
            self.pair_event_applied = false;
        }

        PlaybackUpdate { pose, event }
    }
}

fn interpolate(from: &TransformFrame, to: &TransformFrame, t: f64) -> Pose {
    let position = from.position().lerp(to.position(), t);

    let from_rotation = from.rotation();
    let to_rotation = to.rotation();
    let rotation = if from_rotation.dot(to_rotation) < 0.0 {
        from_rotation.slerp(-to_rotation, t)
    } else {
        from_rotation.slerp(to_rotation, t)
    };

    Pose { position, rotation }
}
