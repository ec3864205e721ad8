use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use glam::{DQuat, DVec3};

use netpose::{
    Clock, ClientEvent, InterpolationConfig, MotionFlags, ReceiverHandle, RelayClient,
    ReplicationReceiver, ReplicationSink, SenderConfig, TransformEvent, TransformFrame,
    TransformSender,
};

const WALK_SPEED: f64 = 2.0;
const SPRINT_SPEED: f64 = 4.5;
const JUMP_VELOCITY: f64 = 5.0;
const GRAVITY: f64 = -9.81;
const ARRIVE_DISTANCE: f64 = 0.5;

fn rand_unit() -> f64 {
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
    (hasher.finish() % 10000) as f64 / 10000.0
}

fn rand_range(min: f64, max: f64) -> f64 {
    min + rand_unit() * (max - min)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    WaitingForSync,
    Joining,
    Running,
    Failed,
}

#[derive(Debug)]
struct Peer {
    position: DVec3,
    #[allow(dead_code)]
    rotation: DQuat,
    flags: MotionFlags,
}

/// Observer-side state mirrored from the replication callbacks, the bot
/// equivalent of driving an animation rig.
#[derive(Debug, Default)]
pub struct PeerView {
    peers: HashMap<u32, Peer>,
    pub poses_applied: u64,
    pub events_applied: u64,
}

impl PeerView {
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Axis-aligned bounds of every peer position this view has applied.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let mut peers = self.peers.values();
        let first = peers.next()?;
        let mut min = first.position;
        let mut max = first.position;
        for peer in peers {
            min = min.min(peer.position);
            max = max.max(peer.position);
        }
        Some((min, max))
    }
}

impl ReplicationSink for PeerView {
    fn entity_joined(&mut self, id: u32, frame: &TransformFrame) {
        self.peers.insert(
            id,
            Peer {
                position: frame.position(),
                rotation: frame.rotation(),
                flags: MotionFlags::empty(),
            },
        );
    }

    fn entity_left(&mut self, id: u32) {
        self.peers.remove(&id);
    }

    fn pose(&mut self, id: u32, position: DVec3, rotation: DQuat) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.position = position;
            peer.rotation = rotation;
            self.poses_applied += 1;
        }
    }

    fn event(&mut self, id: u32, event: TransformEvent) {
        if let Some(peer) = self.peers.get_mut(&id) {
            event.apply(&mut peer.flags);
            self.events_applied += 1;
        }
    }
}

/// One simulated player: wanders between random targets on a flat field,
/// occasionally jumping and sprinting, while replicating itself out and
/// every other client back in.
pub struct Bot {
    client: RelayClient,
    sender: TransformSender,
    receiver: ReplicationReceiver,
    inbound: ReceiverHandle,
    view: PeerView,
    phase: Phase,

    position: DVec3,
    yaw: f64,
    vertical_velocity: f64,
    flags: MotionFlags,

    field_size: f64,
    target: DVec3,
    retarget_deadline: f64,
    jump_deadline: f64,
    sprint_deadline: f64,
}

impl Bot {
    pub fn new(server_addr: SocketAddr, field_size: f64) -> io::Result<Self> {
        let mut client = RelayClient::new()?;
        client.connect(server_addr)?;

        let receiver = ReplicationReceiver::new(InterpolationConfig::default());
        let inbound = receiver.handle();

        let spawn = DVec3::new(
            rand_range(0.0, field_size),
            0.0,
            rand_range(0.0, field_size),
        );

        Ok(Self {
            client,
            sender: TransformSender::new(&SenderConfig::default()),
            receiver,
            inbound,
            view: PeerView::default(),
            phase: Phase::Connecting,
            position: spawn,
            yaw: rand_range(0.0, std::f64::consts::TAU),
            vertical_velocity: 0.0,
            flags: MotionFlags::GROUNDED,
            field_size,
            target: spawn,
            retarget_deadline: 0.0,
            jump_deadline: 0.0,
            sprint_deadline: 0.0,
        })
    }

    pub fn update(&mut self, dt: f64) -> io::Result<()> {
        let events = self.client.poll(&self.inbound)?;
        for event in events {
            match event {
                ClientEvent::Connected { client_id } => {
                    log::debug!("bot connected as client {}", client_id);
                }
                ClientEvent::ConnectionFailed { reason } => {
                    log::warn!("bot connection failed: {}", reason);
                    self.phase = Phase::Failed;
                }
                ClientEvent::JoinResult { success } => {
                    if success {
                        self.phase = Phase::Running;
                    } else {
                        log::warn!("bot join rejected");
                        self.phase = Phase::Failed;
                    }
                }
                ClientEvent::Disconnected => {
                    log::warn!("bot lost its relay connection");
                    self.sender.reset();
                    self.receiver.clear(&mut self.view);
                    self.phase = Phase::Failed;
                }
            }
        }

        match self.phase {
            Phase::Connecting => {
                if self.client.is_connected() {
                    self.phase = Phase::WaitingForSync;
                }
            }
            Phase::WaitingForSync => {
                if self.client.clock().is_synchronized() {
                    let frame = TransformFrame::new(
                        self.position,
                        self.rotation(),
                        TransformEvent::None,
                        self.client.clock().now(),
                    );
                    self.client.join_world(frame)?;
                    self.phase = Phase::Joining;
                }
            }
            Phase::Joining | Phase::Failed => {}
            Phase::Running => {
                self.steer(dt);
                self.replicate()?;
            }
        }

        Ok(())
    }

    fn rotation(&self) -> DQuat {
        DQuat::from_rotation_y(self.yaw)
    }

    fn steer(&mut self, dt: f64) {
        let now = self.client.clock().now();

        if now >= self.retarget_deadline {
            self.target = DVec3::new(
                rand_range(0.0, self.field_size),
                0.0,
                rand_range(0.0, self.field_size),
            );
            self.retarget_deadline = now + rand_range(2.0, 5.0);
        }
        if now >= self.sprint_deadline {
            self.flags.set(MotionFlags::SPRINTING, rand_unit() < 0.5);
            self.sprint_deadline = now + rand_range(1.0, 5.0);
        }

        let grounded = self.flags.contains(MotionFlags::GROUNDED);
        if now >= self.jump_deadline {
            if grounded && rand_unit() < 0.5 {
                self.vertical_velocity = JUMP_VELOCITY;
                self.flags.remove(MotionFlags::GROUNDED);
            }
            self.jump_deadline = now + rand_range(4.0, 8.0);
        }

        // horizontal wander
        let mut to_target = self.target - self.position;
        to_target.y = 0.0;
        let distance = to_target.length();
        let walking = distance > ARRIVE_DISTANCE;
        if walking {
            let speed = if self.flags.contains(MotionFlags::SPRINTING) {
                SPRINT_SPEED
            } else {
                WALK_SPEED
            };
            let direction = to_target / distance;
            self.position += direction * (speed * dt).min(distance);
            self.yaw = direction.x.atan2(direction.z);
        }
        self.flags.set(MotionFlags::WALKING, walking);

        // vertical arc
        if !self.flags.contains(MotionFlags::GROUNDED) {
            self.vertical_velocity += GRAVITY * dt;
            self.position.y += self.vertical_velocity * dt;
            if self.position.y <= 0.0 {
                self.position.y = 0.0;
                self.vertical_velocity = 0.0;
                self.flags.insert(MotionFlags::GROUNDED);
            }
        }
        let airborne = !self.flags.contains(MotionFlags::GROUNDED);
        self.flags
            .set(MotionFlags::JUMPING, airborne && self.vertical_velocity > 0.0);
        self.flags
            .set(MotionFlags::FALLING, airborne && self.vertical_velocity <= 0.0);
    }

    fn replicate(&mut self) -> io::Result<()> {
        let now = self.client.clock().now();
        let rotation = self.rotation();

        let Bot {
            client,
            sender,
            receiver,
            view,
            position,
            flags,
            ..
        } = self;

        sender.update(client.clock(), *flags, *position, rotation);
        sender.flush(now, client)?;
        receiver.tick(client.clock(), view);

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn has_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    pub fn view(&self) -> &PeerView {
        &self.view
    }

    pub fn playback_offset(&self) -> f64 {
        self.receiver.offset()
    }

    pub fn shutdown(&mut self) {
        let _ = self.client.disconnect();
    }
}
