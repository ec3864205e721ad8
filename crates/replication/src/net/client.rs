use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::clock::SyncedClock;
use crate::sync::{FrameTransport, ReceiverHandle};

use super::endpoint::{ConnectionState, NetworkEndpoint, NetworkStats};
use super::protocol::{Message, TransformFrame};

const HELLO_RESEND_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected { client_id: u32 },
    ConnectionFailed { reason: String },
    JoinResult { success: bool },
    Disconnected,
}

/// Client session against a relay: connects, keeps the synced clock fed
/// with time-sync round trips, forwards remote-entity traffic into a
/// receiver handle, and sends the local frame batches.
pub struct RelayClient {
    endpoint: NetworkEndpoint,
    state: ConnectionState,
    client_id: Option<u32>,
    clock: SyncedClock,
    joined: bool,
    sync_interval: Duration,
    last_sync_time: Instant,
    connect_timeout: Duration,
    connect_started: Option<Instant>,
    last_hello_time: Instant,
}

impl RelayClient {
    pub fn new() -> io::Result<Self> {
        let endpoint = NetworkEndpoint::bind("0.0.0.0:0")?;

        Ok(Self {
            endpoint,
            state: ConnectionState::Disconnected,
            client_id: None,
            clock: SyncedClock::new(),
            joined: false,
            sync_interval: Duration::from_millis(250),
            last_sync_time: Instant::now(),
            connect_timeout: Duration::from_secs(5),
            connect_started: None,
            last_hello_time: Instant::now(),
        })
    }

    pub fn connect(&mut self, server_addr: SocketAddr) -> io::Result<()> {
        log::info!("connecting to {}", server_addr);

        self.endpoint.set_remote(server_addr);
        self.state = ConnectionState::Connecting;
        self.connect_started = Some(Instant::now());
        self.send_hello()?;

        Ok(())
    }

    pub fn disconnect(&mut self) -> io::Result<()> {
        if self.state == ConnectionState::Connected {
            let packet = self.endpoint.create_packet(Message::Disconnect);
            let _ = self.endpoint.send(&packet);
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.client_id = None;
        self.joined = false;
        self.clock.reset();
        self.endpoint.reset();
        self.connect_started = None;
    }

    fn send_hello(&mut self) -> io::Result<()> {
        let packet = self.endpoint.create_packet(Message::Hello);
        self.endpoint.send(&packet)?;
        self.last_hello_time = Instant::now();
        Ok(())
    }

    fn send_time_sync(&mut self) -> io::Result<()> {
        let packet = self.endpoint.create_packet(Message::TimeSync {
            client_time: self.clock.local_now(),
        });
        self.endpoint.send(&packet)?;
        self.last_sync_time = Instant::now();
        Ok(())
    }

    /// Requests entry into the relay's world; the outcome arrives later as
    /// a [`ClientEvent::JoinResult`]. Not retried on failure, the caller
    /// decides.
    pub fn join_world(&mut self, frame: TransformFrame) -> io::Result<()> {
        let packet = self.endpoint.create_packet(Message::JoinWorld { frame });
        self.endpoint.send(&packet)?;
        Ok(())
    }

    pub fn leave_world(&mut self) -> io::Result<()> {
        let packet = self.endpoint.create_packet(Message::LeaveWorld);
        self.endpoint.send(&packet)?;
        self.joined = false;
        Ok(())
    }

    /// Drains the socket, routes remote-entity traffic into `inbound`, and
    /// runs the periodic housekeeping (time sync, hello resend, timeouts).
    /// Called once per host tick; never blocks.
    pub fn poll(&mut self, inbound: &ReceiverHandle) -> io::Result<Vec<ClientEvent>> {
        let mut events = Vec::new();

        for (packet, _addr) in self.endpoint.receive()? {
            self.handle_message(packet.payload, inbound, &mut events);
        }

        match self.state {
            ConnectionState::Connecting => {
                if let Some(started) = self.connect_started {
                    if started.elapsed() > self.connect_timeout {
                        log::warn!("connection attempt timed out");
                        events.push(ClientEvent::ConnectionFailed {
                            reason: "timed out".to_string(),
                        });
                        self.reset();
                    } else if self.last_hello_time.elapsed() >= HELLO_RESEND_INTERVAL {
                        self.send_hello()?;
                    }
                }
            }
            ConnectionState::Connected => {
                if self.last_sync_time.elapsed() >= self.sync_interval {
                    self.send_time_sync()?;
                }
                if self.endpoint.is_timed_out() {
                    log::warn!("relay connection lost");
                    events.push(ClientEvent::Disconnected);
                    self.reset();
                }
            }
            ConnectionState::Disconnected => {}
        }

        Ok(events)
    }

    fn handle_message(
        &mut self,
        message: Message,
        inbound: &ReceiverHandle,
        events: &mut Vec<ClientEvent>,
    ) {
        match message {
            Message::Welcome { client_id } => {
                if self.state == ConnectionState::Connecting {
                    log::info!("connected to relay with client ID {}", client_id);
                    self.state = ConnectionState::Connected;
                    self.client_id = Some(client_id);
                    self.connect_started = None;
                    let _ = self.send_time_sync();
                    events.push(ClientEvent::Connected { client_id });
                }
            }
            Message::Denied { reason } => {
                log::warn!("connection denied: {}", reason);
                events.push(ClientEvent::ConnectionFailed { reason });
                self.reset();
            }
            Message::TimeSyncReply {
                client_time,
                server_time,
            } => {
                self.clock.on_time_sync_reply(client_time, server_time);
            }
            Message::JoinResult { success } => {
                self.joined = success;
                events.push(ClientEvent::JoinResult { success });
            }
            Message::ClientJoined { client_id, frame } => {
                inbound.joined(client_id, frame);
            }
            Message::ClientLeft { client_id } => {
                inbound.left(client_id);
            }
            Message::ClientFrames { client_id, frames } => {
                inbound.frames(client_id, frames);
            }
            Message::Disconnect => {
                log::info!("disconnected by relay");
                events.push(ClientEvent::Disconnected);
                self.reset();
            }
            _ => {}
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn has_joined(&self) -> bool {
        self.joined
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn clock(&self) -> &SyncedClock {
        &self.clock
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }
}

impl FrameTransport for RelayClient {
    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.joined
    }

    fn send_batch(&mut self, frames: &[TransformFrame]) -> io::Result<()> {
        let packet = self.endpoint.create_packet(Message::FrameBatch {
            frames: frames.to_vec(),
        });
        self.endpoint.send(&packet)?;
        Ok(())
    }
}
