use std::io;

use glam::{DQuat, DVec3};

use crate::clock::Clock;
use crate::config::SenderConfig;
use crate::net::protocol::{MotionFlags, TransformEvent, TransformFrame};

use super::FrameTransport;

/// Flags whose transitions are captured as discrete events. Grounded is
/// derivable from jump/fall on the observer side and is not replicated.
const EVENT_FLAGS: [MotionFlags; 4] = [
    MotionFlags::WALKING,
    MotionFlags::JUMPING,
    MotionFlags::FALLING,
    MotionFlags::SPRINTING,
];

/// Smallest spacing between two frames captured in the same tick; keeps
/// per-entity timestamps strictly increasing when several flags flip at once.
const TIMESTAMP_NUDGE: f64 = 1e-6;

/// Decides, per local tick, whether the local pose is worth snapshotting.
/// Captured frames go into a [`DispatchQueue`]; no network I/O happens here.
#[derive(Debug)]
pub struct CaptureScheduler {
    store_interval: f64,
    store_interval_fast: f64,
    last_flags: MotionFlags,
    last_position: DVec3,
    last_rotation: DQuat,
    next_store_time: f64,
    last_timestamp: f64,
}

impl CaptureScheduler {
    pub fn new(config: &SenderConfig) -> Self {
        Self {
            store_interval: config.store_interval,
            store_interval_fast: config.store_interval_fast,
            last_flags: MotionFlags::empty(),
            last_position: DVec3::ZERO,
            last_rotation: DQuat::IDENTITY,
            next_store_time: 0.0,
            last_timestamp: f64::NEG_INFINITY,
        }
    }

    /// Runs one capture tick. Every flag that toggled since the previous
    /// tick yields its own event frame, so transitions are never coalesced;
    /// the periodic path then samples the pose if it moved or the entity is
    /// airborne.
    pub fn capture<C: Clock>(
        &mut self,
        clock: &C,
        flags: MotionFlags,
        position: DVec3,
        rotation: DQuat,
        queue: &mut DispatchQueue,
    ) {
        if !clock.is_synchronized() {
            return;
        }
        let now = clock.now();

        let toggled = flags ^ self.last_flags;
        for flag in EVENT_FLAGS {
            if toggled.contains(flag) {
                let event = TransformEvent::from_transition(flag, flags.contains(flag));
                self.store(now, flags, position, rotation, event, queue);
            }
        }
        self.last_flags = flags;

        if now > self.next_store_time {
            let moved = position != self.last_position || rotation != self.last_rotation;
            let airborne = flags.intersects(MotionFlags::JUMPING | MotionFlags::FALLING);
            if moved || airborne {
                self.store(now, flags, position, rotation, TransformEvent::None, queue);
                self.last_position = position;
                self.last_rotation = rotation;
            }
        }
    }

    fn store(
        &mut self,
        now: f64,
        flags: MotionFlags,
        position: DVec3,
        rotation: DQuat,
        event: TransformEvent,
        queue: &mut DispatchQueue,
    ) {
        let mut timestamp = now;
        if timestamp <= self.last_timestamp {
            timestamp = self.last_timestamp + TIMESTAMP_NUDGE;
        }
        self.last_timestamp = timestamp;

        queue.push(TransformFrame::new(position, rotation, event, timestamp));

        let interval = if flags.intersects(MotionFlags::JUMPING | MotionFlags::FALLING) {
            self.store_interval_fast
        } else {
            self.store_interval
        };
        self.next_store_time = now + interval;
    }

    pub fn reset(&mut self) {
        self.last_flags = MotionFlags::empty();
        self.last_position = DVec3::ZERO;
        self.last_rotation = DQuat::IDENTITY;
        self.next_store_time = 0.0;
        self.last_timestamp = f64::NEG_INFINITY;
    }
}

/// Accumulates captured frames and flushes them as one batch at a bounded
/// rate. Frames leave in capture order, never reordered, never duplicated.
#[derive(Debug)]
pub struct DispatchQueue {
    pending: Vec<TransformFrame>,
    send_interval: f64,
    next_send_time: f64,
}

impl DispatchQueue {
    pub fn new(config: &SenderConfig) -> Self {
        Self {
            pending: Vec::new(),
            send_interval: config.send_interval,
            next_send_time: 0.0,
        }
    }

    pub fn push(&mut self, frame: TransformFrame) {
        self.pending.push(frame);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[TransformFrame] {
        &self.pending
    }

    /// Flushes the accumulated batch if the send interval has elapsed.
    /// While the transport is disconnected this is a no-op and frames keep
    /// accumulating. A batch handed to the transport is considered spent
    /// even when the send fails; the channel is unreliable anyway and
    /// retrying stale poses only widens the next batch.
    pub fn flush<T: FrameTransport>(&mut self, now: f64, transport: &mut T) -> io::Result<()> {
        if !transport.is_connected() {
            return Ok(());
        }
        if now < self.next_send_time {
            return Ok(());
        }
        self.next_send_time = now + self.send_interval;

        if self.pending.is_empty() {
            return Ok(());
        }

        let result = transport.send_batch(&self.pending);
        self.pending.clear();
        result
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.next_send_time = 0.0;
    }
}

/// Sender-side driver tying the capture scheduler to the dispatch queue.
#[derive(Debug)]
pub struct TransformSender {
    scheduler: CaptureScheduler,
    queue: DispatchQueue,
}

impl TransformSender {
    pub fn new(config: &SenderConfig) -> Self {
        Self {
            scheduler: CaptureScheduler::new(config),
            queue: DispatchQueue::new(config),
        }
    }

    pub fn update<C: Clock>(
        &mut self,
        clock: &C,
        flags: MotionFlags,
        position: DVec3,
        rotation: DQuat,
    ) {
        self.scheduler
            .capture(clock, flags, position, rotation, &mut self.queue);
    }

    pub fn flush<T: FrameTransport>(&mut self, now: f64, transport: &mut T) -> io::Result<()> {
        self.queue.flush(now, transport)
    }

    pub fn pending_frames(&self) -> usize {
        self.queue.len()
    }

    /// Discards accumulated frames and capture state, used on disconnect.
    pub fn reset(&mut self) {
        self.scheduler.reset();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    struct VecTransport {
        connected: bool,
        batches: Vec<Vec<TransformFrame>>,
    }

    impl VecTransport {
        fn new() -> Self {
            Self {
                connected: true,
                batches: Vec::new(),
            }
        }
    }

    impl FrameTransport for VecTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send_batch(&mut self, frames: &[TransformFrame]) -> io::Result<()> {
            self.batches.push(frames.to_vec());
            Ok(())
        }
    }

    fn config() -> SenderConfig {
        SenderConfig {
            send_interval: 0.5,
            store_interval: 0.5,
            store_interval_fast: 0.2,
        }
    }

    #[test]
    fn unsynchronized_clock_captures_nothing() {
        let clock = ManualClock::unsynchronized();
        let mut scheduler = CaptureScheduler::new(&config());
        let mut queue = DispatchQueue::new(&config());

        scheduler.capture(
            &clock,
            MotionFlags::WALKING,
            DVec3::new(1.0, 0.0, 0.0),
            DQuat::IDENTITY,
            &mut queue,
        );

        assert!(queue.is_empty());
    }

    #[test]
    fn flag_toggles_yield_one_frame_per_transition() {
        let clock = ManualClock::new(10.0);
        let mut scheduler = CaptureScheduler::new(&config());
        let mut queue = DispatchQueue::new(&config());
        let position = DVec3::ZERO;
        let rotation = DQuat::IDENTITY;

        // jump true -> false -> true inside one store interval
        scheduler.capture(&clock, MotionFlags::JUMPING, position, rotation, &mut queue);
        clock.advance(0.01);
        scheduler.capture(&clock, MotionFlags::empty(), position, rotation, &mut queue);
        clock.advance(0.01);
        scheduler.capture(&clock, MotionFlags::JUMPING, position, rotation, &mut queue);

        let events: Vec<TransformEvent> = queue.pending().iter().map(|f| f.event()).collect();
        assert_eq!(
            events,
            vec![
                TransformEvent::JumpStart,
                TransformEvent::JumpStop,
                TransformEvent::JumpStart,
            ]
        );
    }

    #[test]
    fn simultaneous_toggles_are_not_coalesced() {
        let clock = ManualClock::new(5.0);
        let mut scheduler = CaptureScheduler::new(&config());
        let mut queue = DispatchQueue::new(&config());

        let flags = MotionFlags::WALKING | MotionFlags::JUMPING | MotionFlags::SPRINTING;
        scheduler.capture(&clock, flags, DVec3::ZERO, DQuat::IDENTITY, &mut queue);

        let events: Vec<TransformEvent> = queue
            .pending()
            .iter()
            .map(|f| f.event())
            .filter(|e| *e != TransformEvent::None)
            .collect();
        assert_eq!(
            events,
            vec![
                TransformEvent::WalkStart,
                TransformEvent::JumpStart,
                TransformEvent::SprintStart,
            ]
        );
    }

    #[test]
    fn same_tick_timestamps_stay_strictly_increasing() {
        let clock = ManualClock::new(5.0);
        let mut scheduler = CaptureScheduler::new(&config());
        let mut queue = DispatchQueue::new(&config());

        let flags = MotionFlags::WALKING | MotionFlags::JUMPING | MotionFlags::SPRINTING;
        scheduler.capture(&clock, flags, DVec3::ZERO, DQuat::IDENTITY, &mut queue);

        let frames = queue.pending();
        assert!(frames.len() >= 2);
        for pair in frames.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
    }

    #[test]
    fn periodic_capture_skips_stationary_pose() {
        let clock = ManualClock::new(0.0);
        let mut scheduler = CaptureScheduler::new(&config());
        let mut queue = DispatchQueue::new(&config());
        let position = DVec3::new(3.0, 0.0, 1.0);
        let rotation = DQuat::IDENTITY;

        clock.advance(1.0);
        scheduler.capture(&clock, MotionFlags::empty(), position, rotation, &mut queue);
        assert_eq!(queue.len(), 1);

        // unchanged pose, interval elapsed again: nothing stored
        clock.advance(1.0);
        scheduler.capture(&clock, MotionFlags::empty(), position, rotation, &mut queue);
        assert_eq!(queue.len(), 1);

        // moved: stored
        clock.advance(1.0);
        let moved = position + DVec3::new(0.5, 0.0, 0.0);
        scheduler.capture(&clock, MotionFlags::empty(), moved, rotation, &mut queue);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn airborne_pose_is_sampled_even_when_stationary() {
        let clock = ManualClock::new(0.0);
        let mut scheduler = CaptureScheduler::new(&config());
        let mut queue = DispatchQueue::new(&config());
        let position = DVec3::ZERO;

        clock.advance(1.0);
        let flags = MotionFlags::FALLING;
        scheduler.capture(&clock, flags, position, DQuat::IDENTITY, &mut queue);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending()[0].event(), TransformEvent::FallStart);

        // fast interval applies while falling; the pose is sampled despite
        // zero movement
        clock.advance(0.25);
        scheduler.capture(&clock, flags, position, DQuat::IDENTITY, &mut queue);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pending()[1].event(), TransformEvent::None);

        clock.advance(0.25);
        scheduler.capture(&clock, flags, position, DQuat::IDENTITY, &mut queue);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn flush_respects_send_interval_and_order() {
        let clock = ManualClock::new(0.0);
        let mut sender = TransformSender::new(&config());
        let mut transport = VecTransport::new();

        clock.advance(1.0);
        sender.update(&clock, MotionFlags::WALKING, DVec3::X, DQuat::IDENTITY);
        clock.advance(0.6);
        sender.update(&clock, MotionFlags::WALKING, DVec3::X * 2.0, DQuat::IDENTITY);

        sender.flush(clock.now(), &mut transport).unwrap();
        assert_eq!(transport.batches.len(), 1);
        assert_eq!(sender.pending_frames(), 0);

        let batch = &transport.batches[0];
        for pair in batch.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }

        // within the send interval nothing goes out
        clock.advance(0.1);
        sender.update(&clock, MotionFlags::empty(), DVec3::X * 3.0, DQuat::IDENTITY);
        sender.flush(clock.now(), &mut transport).unwrap();
        assert_eq!(transport.batches.len(), 1);
        assert!(sender.pending_frames() > 0);
    }

    #[test]
    fn disconnected_flush_keeps_frames() {
        let clock = ManualClock::new(1.0);
        let mut sender = TransformSender::new(&config());
        let mut transport = VecTransport::new();
        transport.connected = false;

        sender.update(&clock, MotionFlags::WALKING, DVec3::X, DQuat::IDENTITY);
        sender.flush(clock.now(), &mut transport).unwrap();
        assert!(transport.batches.is_empty());
        assert!(sender.pending_frames() > 0);

        transport.connected = true;
        sender.flush(clock.now(), &mut transport).unwrap();
        assert_eq!(transport.batches.len(), 1);
    }
}
