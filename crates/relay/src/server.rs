use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use netpose::{
    LinkConditioner, Message, NetworkEndpoint, Packet, SessionManager, TransformFrame,
};

use crate::config::RelayConfig;

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Stateless frame forwarder: accepts sessions, answers time-sync requests
/// against its own epoch, and rebroadcasts every joined client's frame
/// batches to the other joined clients. Frame contents are never inspected.
pub struct RelayServer {
    endpoint: NetworkEndpoint,
    sessions: SessionManager,
    conditioner: Option<LinkConditioner>,
    tick_duration: Duration,
    started: Instant,
    running: Arc<AtomicBool>,
    next_status_time: Instant,
}

impl RelayServer {
    pub fn new(bind_addr: &str, config: RelayConfig) -> io::Result<Self> {
        let mut endpoint = NetworkEndpoint::bind(bind_addr)?;
        endpoint.set_server_mode(true);

        Ok(Self {
            endpoint,
            sessions: SessionManager::new(
                config.max_clients,
                Duration::from_secs(config.timeout_secs),
            ),
            conditioner: config.conditioner.map(LinkConditioner::new),
            tick_duration: Duration::from_secs_f64(1.0 / config.tick_rate as f64),
            started: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            next_status_time: Instant::now() + STATUS_INTERVAL,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Seconds since the relay started; the time base every client clock
    /// synchronizes against.
    pub fn server_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();
            self.tick_once();

            let elapsed = tick_start.elapsed();
            if elapsed < self.tick_duration {
                std::thread::sleep(self.tick_duration - elapsed);
            }
        }
        self.shutdown_sessions();
    }

    pub fn tick_once(&mut self) {
        if let Err(e) = self.process_network() {
            log::error!("network error: {}", e);
        }

        self.flush_conditioner();

        for session in self.sessions.cleanup_timed_out() {
            log::info!("client {} timed out", session.client_id);
            if session.joined {
                self.broadcast_left(session.client_id);
            }
        }

        let now = Instant::now();
        if now >= self.next_status_time {
            let stats = self.endpoint.stats();
            log::info!(
                "{} sessions ({} joined) | rx {} pkts / tx {} pkts | uptime {:.0}s",
                self.sessions.len(),
                self.sessions.joined_count(),
                stats.packets_received,
                stats.packets_sent,
                self.server_time()
            );
            self.next_status_time = now + STATUS_INTERVAL;
        }
    }

    pub fn shutdown_sessions(&mut self) {
        let addrs: Vec<SocketAddr> = self.sessions.iter().map(|s| s.addr).collect();
        for addr in addrs {
            let packet = self.endpoint.create_packet(Message::Disconnect);
            let _ = self.endpoint.send_to(&packet, addr);
        }
    }

    fn process_network(&mut self) -> io::Result<()> {
        let packets = self.endpoint.receive()?;

        for (packet, addr) in packets {
            self.handle_packet(packet, addr)?;
        }

        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) -> io::Result<()> {
        // per-session ordering filter; Hello precedes the session itself
        if let Some(session) = self.sessions.get_by_addr_mut(&addr) {
            if !session.record_sequence(packet.header.sequence) {
                return Ok(());
            }
            session.touch();
        }

        match packet.payload {
            Message::Hello => self.handle_hello(addr)?,
            Message::TimeSync { client_time } => self.handle_time_sync(addr, client_time)?,
            Message::JoinWorld { frame } => self.handle_join(addr, frame)?,
            Message::FrameBatch { frames } => self.handle_frame_batch(addr, frames)?,
            Message::LeaveWorld => self.handle_leave(addr)?,
            Message::Disconnect => self.handle_disconnect(addr),
            _ => {}
        }

        Ok(())
    }

    fn handle_hello(&mut self, addr: SocketAddr) -> io::Result<()> {
        let client_id = match self.sessions.get_or_create(addr) {
            Ok(session) => session.client_id,
            Err(reason) => {
                log::warn!("denying {}: {}", addr, reason);
                let packet = self.endpoint.create_packet(Message::Denied {
                    reason: reason.to_string(),
                });
                self.endpoint.send_to(&packet, addr)?;
                return Ok(());
            }
        };

        log::info!("client {} connected from {}", client_id, addr);
        let packet = self.endpoint.create_packet(Message::Welcome { client_id });
        self.endpoint.send_to(&packet, addr)?;

        Ok(())
    }

    fn handle_time_sync(&mut self, addr: SocketAddr, client_time: f64) -> io::Result<()> {
        if self.sessions.get_by_addr(&addr).is_none() {
            return Ok(());
        }

        let packet = self.endpoint.create_packet(Message::TimeSyncReply {
            client_time,
            server_time: self.server_time(),
        });
        self.endpoint.send_to(&packet, addr)?;

        Ok(())
    }

    fn handle_join(&mut self, addr: SocketAddr, frame: TransformFrame) -> io::Result<()> {
        let Some(session) = self.sessions.get_by_addr_mut(&addr) else {
            return Ok(());
        };

        session.joined = true;
        session.last_frame = Some(frame);
        let client_id = session.client_id;

        let packet = self
            .endpoint
            .create_packet(Message::JoinResult { success: true });
        self.endpoint.send_to(&packet, addr)?;

        log::info!("client {} joined the world", client_id);

        // announce the newcomer, and replay the existing members to it
        let peers: Vec<(u32, SocketAddr, Option<TransformFrame>)> = self
            .sessions
            .joined()
            .filter(|s| s.client_id != client_id)
            .map(|s| (s.client_id, s.addr, s.last_frame))
            .collect();

        for (peer_id, peer_addr, peer_frame) in peers {
            self.send_conditioned(
                Message::ClientJoined {
                    client_id,
                    frame,
                },
                peer_addr,
            )?;

            if let Some(peer_frame) = peer_frame {
                self.send_conditioned(
                    Message::ClientJoined {
                        client_id: peer_id,
                        frame: peer_frame,
                    },
                    addr,
                )?;
            }
        }

        Ok(())
    }

    fn handle_frame_batch(
        &mut self,
        addr: SocketAddr,
        frames: Vec<TransformFrame>,
    ) -> io::Result<()> {
        let Some(session) = self.sessions.get_by_addr_mut(&addr) else {
            return Ok(());
        };
        if !session.joined || frames.is_empty() {
            return Ok(());
        }

        session.last_frame = frames.last().copied();
        let client_id = session.client_id;

        let targets: Vec<SocketAddr> = self
            .sessions
            .joined()
            .filter(|s| s.client_id != client_id)
            .map(|s| s.addr)
            .collect();

        for target in targets {
            self.send_conditioned(
                Message::ClientFrames {
                    client_id,
                    frames: frames.clone(),
                },
                target,
            )?;
        }

        Ok(())
    }

    fn handle_leave(&mut self, addr: SocketAddr) -> io::Result<()> {
        let Some(session) = self.sessions.get_by_addr_mut(&addr) else {
            return Ok(());
        };
        if !session.joined {
            return Ok(());
        }

        session.joined = false;
        session.last_frame = None;
        let client_id = session.client_id;

        log::info!("client {} left the world", client_id);
        self.broadcast_left(client_id);

        Ok(())
    }

    fn handle_disconnect(&mut self, addr: SocketAddr) {
        if let Some(session) = self.sessions.remove_by_addr(&addr) {
            log::info!("client {} disconnected", session.client_id);
            if session.joined {
                self.broadcast_left(session.client_id);
            }
        }
    }

    fn broadcast_left(&mut self, client_id: u32) {
        let targets: Vec<SocketAddr> = self.sessions.joined().map(|s| s.addr).collect();
        for target in targets {
            let _ = self.send_conditioned(Message::ClientLeft { client_id }, target);
        }
    }

    /// Routes outbound traffic through the link conditioner when one is
    /// configured, otherwise sends directly.
    fn send_conditioned(&mut self, message: Message, addr: SocketAddr) -> io::Result<()> {
        let packet = self.endpoint.create_packet(message);
        match &mut self.conditioner {
            Some(conditioner) => {
                conditioner.push(packet, addr);
                Ok(())
            }
            None => self.endpoint.send_to(&packet, addr).map(|_| ()),
        }
    }

    fn flush_conditioner(&mut self) {
        let Some(conditioner) = &mut self.conditioner else {
            return;
        };
        for (packet, addr) in conditioner.take_ready() {
            let _ = self.endpoint.send_to(&packet, addr);
        }
    }

}
