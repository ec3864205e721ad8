mod client;
mod conditioner;
mod endpoint;
pub mod protocol;
mod session;

pub use client::{ClientEvent, RelayClient};
pub use conditioner::{rand_unit, LinkConditioner, LinkSpec};
pub use endpoint::{ConnectionState, NetworkEndpoint, NetworkStats};
pub use protocol::{
    sequence_greater_than, Message, MotionFlags, Packet, PacketError, PacketHeader,
    TransformEvent, TransformFrame, DEFAULT_PORT, MAX_PACKET_SIZE, PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};
pub use session::{Session, SessionManager};
