use serde::{Deserialize, Serialize};

/// Sender-side pacing. Store intervals bound how often the local pose is
/// snapshotted, the send interval bounds how often stored frames are
/// flushed to the transport as one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Seconds between batch flushes.
    pub send_interval: f64,
    /// Seconds between periodic pose captures.
    pub store_interval: f64,
    /// Capture interval used while jumping or falling, where motion is
    /// non-linear and cheap to get visibly wrong.
    pub store_interval_fast: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            send_interval: 0.5,
            store_interval: 0.5,
            store_interval_fast: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationConfig {
    /// Playback offset used until the adaptive estimator has a full window.
    pub initial_offset: f64,
    pub min_offset: f64,
    pub max_offset: f64,
    /// Fixed margin added on top of the doubled average lag.
    pub offset_margin: f64,
    /// Sliding-window sample count for the lag average.
    pub window_len: usize,
    /// Seconds between offset recomputations.
    pub update_interval: f64,
    /// Inbound queue items handled per tick; the rest stay queued.
    pub max_items_per_tick: usize,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            initial_offset: 1.0,
            min_offset: 0.1,
            max_offset: 1.0,
            offset_margin: 0.1,
            window_len: 10,
            update_interval: 0.2,
            max_items_per_tick: 32,
        }
    }
}
