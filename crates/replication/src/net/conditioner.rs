use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::protocol::Packet;

/// Artificial link degradation applied to outbound relay traffic, used to
/// exercise the adaptive playback offset without a real bad network.
#[derive(Debug, Clone, Default)]
pub struct LinkSpec {
    pub enabled: bool,
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl LinkSpec {
    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand_unit() * 100.0 < self.loss_percent
    }

    pub fn delay(&self) -> Duration {
        if !self.enabled || self.max_latency_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            (rand_unit() * self.jitter_ms as f32) as u32
        } else {
            0
        };
        Duration::from_millis((base + (rand_unit() * range as f32) as u32 + jitter) as u64)
    }
}

pub fn rand_unit() -> f32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64,
    );
    (hasher.finish() % 10000) as f32 / 10000.0
}

#[derive(Debug)]
struct DelayedPacket {
    release_time: Instant,
    packet: Packet,
    addr: SocketAddr,
}

impl PartialEq for DelayedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.release_time == other.release_time
    }
}

impl Eq for DelayedPacket {}

impl PartialOrd for DelayedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other.release_time.cmp(&self.release_time)
    }
}

/// Holds outbound packets back until their artificial delay elapses.
#[derive(Debug)]
pub struct LinkConditioner {
    spec: LinkSpec,
    queue: BinaryHeap<DelayedPacket>,
}

impl LinkConditioner {
    pub fn new(spec: LinkSpec) -> Self {
        Self {
            spec,
            queue: BinaryHeap::new(),
        }
    }

    pub fn spec(&self) -> &LinkSpec {
        &self.spec
    }

    /// Queues a packet for delayed delivery. Returns false when the packet
    /// was dropped by the loss model instead.
    pub fn push(&mut self, packet: Packet, addr: SocketAddr) -> bool {
        if self.spec.should_drop() {
            return false;
        }
        self.queue.push(DelayedPacket {
            release_time: Instant::now() + self.spec.delay(),
            packet,
            addr,
        });
        true
    }

    pub fn take_ready(&mut self) -> Vec<(Packet, SocketAddr)> {
        let mut packets = Vec::new();
        let now = Instant::now();
        while let Some(delayed) = self.queue.peek() {
            if delayed.release_time <= now {
                let delayed = self.queue.pop().unwrap();
                packets.push((delayed.packet, delayed.addr));
            } else {
                break;
            }
        }
        packets
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
