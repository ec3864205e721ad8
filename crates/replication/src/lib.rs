pub mod clock;
pub mod config;
pub mod net;
pub mod sync;

pub use clock::{Clock, ManualClock, SyncedClock};
pub use config::{InterpolationConfig, SenderConfig};
pub use net::{
    ClientEvent, ConnectionState, LinkConditioner, LinkSpec, Message, MotionFlags,
    NetworkEndpoint, NetworkStats, Packet, PacketError, PacketHeader, RelayClient, Session,
    SessionManager, TransformEvent, TransformFrame, DEFAULT_PORT, MAX_PACKET_SIZE,
    PROTOCOL_MAGIC, PROTOCOL_VERSION,
};
pub use sync::{
    AdaptiveDelayEstimator, CaptureScheduler, DispatchQueue, EntityRegistry, FrameTransport,
    InboundItem, InterpolationBuffer, PlaybackUpdate, Pose, ReceiverHandle, RemoteEntity,
    ReplicationReceiver, ReplicationSink, TransformSender,
};
