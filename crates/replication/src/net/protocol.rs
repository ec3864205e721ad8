use bitflags::bitflags;
use glam::{DQuat, DVec3};
use rkyv::{rancor, Archive, Deserialize, Serialize};

pub const MAX_PACKET_SIZE: usize = 4096;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x4E50_5345;
pub const DEFAULT_PORT: u16 = 27045;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

bitflags! {
    /// Motion state of the locally controlled entity. Owned by the local
    /// controller, read by the capture scheduler each tick.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MotionFlags: u8 {
        const WALKING = 1 << 0;
        const JUMPING = 1 << 1;
        const GROUNDED = 1 << 2;
        const FALLING = 1 << 3;
        const SPRINTING = 1 << 4;
    }
}

/// Discrete motion-state transition carried alongside a frame. Each pair of
/// codes marks one boolean flag turning on or off; observers replay the
/// transition into their own animation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum TransformEvent {
    None = 0,
    JumpStart = 1,
    JumpStop = 2,
    FallStart = 3,
    FallStop = 4,
    WalkStart = 5,
    WalkStop = 6,
    GroundedStart = 7,
    GroundedStop = 8,
    SprintStart = 9,
    SprintStop = 10,
}

impl From<u8> for TransformEvent {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::JumpStart,
            2 => Self::JumpStop,
            3 => Self::FallStart,
            4 => Self::FallStop,
            5 => Self::WalkStart,
            6 => Self::WalkStop,
            7 => Self::GroundedStart,
            8 => Self::GroundedStop,
            9 => Self::SprintStart,
            10 => Self::SprintStop,
            _ => Self::None,
        }
    }
}

impl TransformEvent {
    pub fn from_transition(flag: MotionFlags, active: bool) -> Self {
        match (flag, active) {
            (MotionFlags::JUMPING, true) => Self::JumpStart,
            (MotionFlags::JUMPING, false) => Self::JumpStop,
            (MotionFlags::FALLING, true) => Self::FallStart,
            (MotionFlags::FALLING, false) => Self::FallStop,
            (MotionFlags::WALKING, true) => Self::WalkStart,
            (MotionFlags::WALKING, false) => Self::WalkStop,
            (MotionFlags::GROUNDED, true) => Self::GroundedStart,
            (MotionFlags::GROUNDED, false) => Self::GroundedStop,
            (MotionFlags::SPRINTING, true) => Self::SprintStart,
            (MotionFlags::SPRINTING, false) => Self::SprintStop,
            _ => Self::None,
        }
    }

    /// Replays the transition into an observer-side flag set.
    pub fn apply(self, flags: &mut MotionFlags) {
        match self {
            Self::None => {}
            Self::JumpStart => flags.insert(MotionFlags::JUMPING),
            Self::JumpStop => flags.remove(MotionFlags::JUMPING),
            Self::FallStart => flags.insert(MotionFlags::FALLING),
            Self::FallStop => flags.remove(MotionFlags::FALLING),
            Self::WalkStart => flags.insert(MotionFlags::WALKING),
            Self::WalkStop => flags.remove(MotionFlags::WALKING),
            Self::GroundedStart => flags.insert(MotionFlags::GROUNDED),
            Self::GroundedStop => flags.remove(MotionFlags::GROUNDED),
            Self::SprintStart => flags.insert(MotionFlags::SPRINTING),
            Self::SprintStop => flags.remove(MotionFlags::SPRINTING),
        }
    }
}

/// One captured snapshot of an entity's pose: the wire unit of replication.
/// Immutable once created. Timestamps within one entity's stream strictly
/// increase in capture order.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct TransformFrame {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub rw: f64,
    pub state: u8,
    pub timestamp: f64,
}

impl TransformFrame {
    pub fn new(position: DVec3, rotation: DQuat, event: TransformEvent, timestamp: f64) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            rx: rotation.x,
            ry: rotation.y,
            rz: rotation.z,
            rw: rotation.w,
            state: event as u8,
            timestamp,
        }
    }

    pub fn position(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    pub fn rotation(&self) -> DQuat {
        DQuat::from_xyzw(self.rx, self.ry, self.rz, self.rw).normalize()
    }

    pub fn event(&self) -> TransformEvent {
        TransformEvent::from(self.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Message {
    Hello,
    Welcome {
        client_id: u32,
    },
    Denied {
        reason: String,
    },
    TimeSync {
        client_time: f64,
    },
    TimeSyncReply {
        client_time: f64,
        server_time: f64,
    },
    JoinWorld {
        frame: TransformFrame,
    },
    JoinResult {
        success: bool,
    },
    LeaveWorld,
    FrameBatch {
        frames: Vec<TransformFrame>,
    },
    ClientJoined {
        client_id: u32,
        frame: TransformFrame,
    },
    ClientLeft {
        client_id: u32,
    },
    ClientFrames {
        client_id: u32,
        frames: Vec<TransformFrame>,
    },
    Disconnect,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Message,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

impl Packet {
    pub fn new(header: PacketHeader, payload: Message) -> Self {
        Self { header, payload }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(PacketError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn event_code_roundtrip() {
        for code in 0..=10u8 {
            let event = TransformEvent::from(code);
            assert_eq!(event as u8, code);
        }
        assert_eq!(TransformEvent::from(200), TransformEvent::None);
    }

    #[test]
    fn event_transition_pairs() {
        let start = TransformEvent::from_transition(MotionFlags::JUMPING, true);
        let stop = TransformEvent::from_transition(MotionFlags::JUMPING, false);
        assert_eq!(start, TransformEvent::JumpStart);
        assert_eq!(stop, TransformEvent::JumpStop);

        let mut flags = MotionFlags::empty();
        start.apply(&mut flags);
        assert!(flags.contains(MotionFlags::JUMPING));
        stop.apply(&mut flags);
        assert!(!flags.contains(MotionFlags::JUMPING));
    }

    #[test]
    fn frame_accessors() {
        let position = DVec3::new(1.5, -2.0, 3.25);
        let rotation = DQuat::from_rotation_y(std::f64::consts::FRAC_PI_4);
        let frame = TransformFrame::new(position, rotation, TransformEvent::WalkStart, 12.5);

        assert_eq!(frame.position(), position);
        assert!((frame.rotation().dot(rotation) - 1.0).abs() < 1e-12);
        assert_eq!(frame.event(), TransformEvent::WalkStart);
        assert_eq!(frame.timestamp, 12.5);
    }

    #[test]
    fn packet_roundtrip() {
        let frame = TransformFrame::new(
            DVec3::new(10.0, 0.0, -4.0),
            DQuat::IDENTITY,
            TransformEvent::None,
            3.0,
        );
        let packet = Packet::new(
            PacketHeader::new(7),
            Message::FrameBatch {
                frames: vec![frame, frame],
            },
        );

        let bytes = packet.serialize().unwrap();
        let decoded = Packet::deserialize(&bytes).unwrap();

        assert_eq!(packet.header, decoded.header);
        match decoded.payload {
            Message::FrameBatch { frames } => {
                assert_eq!(frames.len(), 2);
                assert_eq!(frames[0], frame);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn header_validation() {
        let mut header = PacketHeader::new(0);
        assert!(header.is_valid());
        header.magic = 0;
        assert!(!header.is_valid());
    }
}
