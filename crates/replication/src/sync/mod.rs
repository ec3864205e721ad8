mod buffer;
mod delay;
mod receiver;
mod registry;
mod sender;

use std::io;

use crate::net::protocol::TransformFrame;

pub use buffer::{InterpolationBuffer, PlaybackUpdate, Pose};
pub use delay::AdaptiveDelayEstimator;
pub use receiver::{InboundItem, ReceiverHandle, ReplicationReceiver, ReplicationSink};
pub use registry::{EntityRegistry, RemoteEntity};
pub use sender::{CaptureScheduler, DispatchQueue, TransformSender};

/// Outbound seam between the dispatch queue and the network. The shipped
/// implementation is [`crate::net::RelayClient`].
pub trait FrameTransport {
    fn is_connected(&self) -> bool;

    fn send_batch(&mut self, frames: &[TransformFrame]) -> io::Result<()>;
}
