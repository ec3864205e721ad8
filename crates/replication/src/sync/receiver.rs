use std::sync::mpsc::{self, Receiver, Sender};

use glam::{DQuat, DVec3};

use crate::clock::Clock;
use crate::config::InterpolationConfig;
use crate::net::protocol::{TransformEvent, TransformFrame};

use super::delay::AdaptiveDelayEstimator;
use super::registry::EntityRegistry;

/// Callbacks into the presentation layer. Poses arrive once per tick while
/// an entity is interpolating; transition events arrive exactly once per
/// frame pair.
pub trait ReplicationSink {
    fn entity_joined(&mut self, id: u32, frame: &TransformFrame);
    fn entity_left(&mut self, id: u32);
    fn pose(&mut self, id: u32, position: DVec3, rotation: DQuat);
    fn event(&mut self, id: u32, event: TransformEvent);
}

#[derive(Debug, Clone)]
pub enum InboundItem {
    Joined { id: u32, frame: TransformFrame },
    Left { id: u32 },
    Frames { id: u32, frames: Vec<TransformFrame> },
}

/// Producer half of the inbound queue, cloneable into the network thread.
/// Sends are fire-and-forget; items for a receiver that has gone away are
/// simply dropped.
#[derive(Debug, Clone)]
pub struct ReceiverHandle {
    tx: Sender<InboundItem>,
}

impl ReceiverHandle {
    pub fn joined(&self, id: u32, frame: TransformFrame) {
        let _ = self.tx.send(InboundItem::Joined { id, frame });
    }

    pub fn left(&self, id: u32) {
        let _ = self.tx.send(InboundItem::Left { id });
    }

    pub fn frames(&self, id: u32, frames: Vec<TransformFrame>) {
        let _ = self.tx.send(InboundItem::Frames { id, frames });
    }
}

/// Receive-side driver: drains the inbound queue, maintains the entity
/// registry, runs the delay estimator, and samples every buffer once per
/// tick, pushing results into the presentation sink.
#[derive(Debug)]
pub struct ReplicationReceiver {
    config: InterpolationConfig,
    registry: EntityRegistry,
    estimator: AdaptiveDelayEstimator,
    inbound: Receiver<InboundItem>,
    handle: ReceiverHandle,
}

impl ReplicationReceiver {
    pub fn new(config: InterpolationConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            estimator: AdaptiveDelayEstimator::new(&config),
            registry: EntityRegistry::new(),
            inbound: rx,
            handle: ReceiverHandle { tx },
            config,
        }
    }

    pub fn handle(&self) -> ReceiverHandle {
        self.handle.clone()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn offset(&self) -> f64 {
        self.estimator.offset()
    }

    /// One consumer tick: drain a bounded number of inbound items, refresh
    /// the shared offset, then sample every entity at `now - offset`.
    /// No-ops until the clock has synchronized.
    pub fn tick<C: Clock, S: ReplicationSink>(&mut self, clock: &C, sink: &mut S) {
        if !clock.is_synchronized() {
            return;
        }
        let now = clock.now();

        self.drain_inbound(sink);
        self.estimator.update(now, &self.registry);

        let playback_time = now - self.estimator.offset();
        for entity in self.registry.iter_mut() {
            let update = entity.buffer.sample(playback_time);
            if let Some(event) = update.event {
                sink.event(entity.id, event);
            }
            if let Some(pose) = update.pose {
                sink.pose(entity.id, pose.position, pose.rotation);
            }
        }
    }

    fn drain_inbound<S: ReplicationSink>(&mut self, sink: &mut S) {
        for _ in 0..self.config.max_items_per_tick {
            let Ok(item) = self.inbound.try_recv() else {
                break;
            };
            match item {
                InboundItem::Joined { id, frame } => {
                    if self.registry.insert(id) {
                        sink.entity_joined(id, &frame);
                    }
                }
                InboundItem::Left { id } => {
                    if self.registry.remove(id) {
                        sink.entity_left(id);
                    }
                }
                InboundItem::Frames { id, frames } => {
                    if let Some(entity) = self.registry.get_mut(id) {
                        entity.buffer.extend(frames);
                        self.estimator.note_frames();
                    } else {
                        // join raced behind, or the entity already left
                        log::trace!("dropping frame batch from unknown entity {}", id);
                    }
                }
            }
        }
    }

    /// Tears down all playback state on disconnect. Every known entity is
    /// reported to the sink as left; queued inbound items are discarded.
    pub fn clear<S: ReplicationSink>(&mut self, sink: &mut S) {
        for id in self.registry.ids() {
            sink.entity_left(id);
        }
        self.registry.clear();
        self.estimator.reset(&self.config);
        while self.inbound.try_recv().is_ok() {}
    }
}
