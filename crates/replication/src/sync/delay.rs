use std::collections::VecDeque;

use crate::config::InterpolationConfig;

use super::registry::EntityRegistry;

/// Chooses the playback offset shared by every interpolation buffer.
///
/// At a fixed cadence, and only when new frames arrived since the last run,
/// it measures how far the clock sits behind the freshest buffered capture
/// time, averages that lag over a sliding window, doubles it for jitter
/// headroom, adds a fixed margin, and clamps the result. Doubling leaves
/// room for one late batch without starving the buffers; the clamp bounds
/// the added latency and keeps a floor of smoothing on a perfect link.
#[derive(Debug)]
pub struct AdaptiveDelayEstimator {
    offset: f64,
    window: VecDeque<f64>,
    window_len: usize,
    min_offset: f64,
    max_offset: f64,
    margin: f64,
    update_interval: f64,
    last_update_time: f64,
    frames_seen: bool,
}

impl AdaptiveDelayEstimator {
    pub fn new(config: &InterpolationConfig) -> Self {
        Self {
            offset: config.initial_offset,
            window: VecDeque::with_capacity(config.window_len),
            window_len: config.window_len,
            min_offset: config.min_offset,
            max_offset: config.max_offset,
            margin: config.offset_margin,
            update_interval: config.update_interval,
            last_update_time: f64::NEG_INFINITY,
            frames_seen: false,
        }
    }

    /// Offset currently subtracted from synchronized time before sampling.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Marks that at least one frame batch arrived since the last update.
    pub fn note_frames(&mut self) {
        self.frames_seen = true;
    }

    pub fn update(&mut self, now: f64, registry: &EntityRegistry) {
        if !self.frames_seen {
            return;
        }
        if now - self.last_update_time < self.update_interval {
            return;
        }
        let Some(latest) = registry.latest_timestamp() else {
            return;
        };

        self.frames_seen = false;
        self.push_sample(now - latest);
        self.last_update_time = now;
    }

    fn push_sample(&mut self, lag: f64) {
        if self.window.len() >= self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(lag);

        // the offset moves only once the window is full; until then the
        // configured initial offset stands
        if self.window.len() >= self.window_len {
            let average = self.window.iter().sum::<f64>() / self.window.len() as f64;
            let target = average * 2.0 + self.margin;
            self.offset = target.clamp(self.min_offset, self.max_offset);
        }
    }

    pub fn reset(&mut self, config: &InterpolationConfig) {
        self.offset = config.initial_offset;
        self.window.clear();
        self.last_update_time = f64::NEG_INFINITY;
        self.frames_seen = false;
    }
}
