use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::protocol::{sequence_greater_than, Message, Packet, PacketHeader, MAX_PACKET_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Non-blocking UDP socket wrapper shared by clients and the relay.
/// Validates the packet header, stamps outgoing sequence numbers, and (in
/// client mode) drops packets that arrive out of order so the single remote
/// peer's stream stays monotone.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    send_sequence: u32,
    last_received_sequence: Option<u32>,
    stats: NetworkStats,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    timeout: Duration,
    last_receive_time: Instant,
    /// When true, skip sequence filtering here; the relay tracks sequences
    /// per session instead.
    server_mode: bool,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            remote_addr: None,
            send_sequence: 0,
            last_received_sequence: None,
            stats: NetworkStats::default(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            timeout: Duration::from_secs(10),
            last_receive_time: Instant::now(),
            server_mode: false,
        })
    }

    pub fn set_server_mode(&mut self, server_mode: bool) {
        self.server_mode = server_mode;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn set_remote(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn create_packet(&mut self, payload: Message) -> Packet {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        Packet::new(PacketHeader::new(sequence), payload)
    }

    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> io::Result<usize> {
        let data = packet.serialize().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("serialization error: {}", e))
        })?;

        if data.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "packet exceeds maximum size",
            ));
        }

        let bytes = self.socket.send_to(&data, addr)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }

    pub fn send(&mut self, packet: &Packet) -> io::Result<usize> {
        let addr = self
            .remote_addr
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no remote address set"))?;
        self.send_to(packet, addr)
    }

    pub fn receive(&mut self) -> io::Result<Vec<(Packet, SocketAddr)>> {
        let mut packets = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    let Ok(packet) = Packet::deserialize(&self.recv_buffer[..size]) else {
                        self.stats.packets_dropped += 1;
                        continue;
                    };

                    if !packet.header.is_valid() {
                        self.stats.packets_dropped += 1;
                        continue;
                    }

                    if !self.server_mode && !self.record_sequence(packet.header.sequence) {
                        self.stats.packets_dropped += 1;
                        continue;
                    }

                    self.stats.packets_received += 1;
                    self.stats.bytes_received += size as u64;
                    self.last_receive_time = Instant::now();
                    packets.push((packet, addr));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(packets)
    }

    fn record_sequence(&mut self, sequence: u32) -> bool {
        match self.last_received_sequence {
            Some(last) if !sequence_greater_than(sequence, last) => false,
            _ => {
                self.last_received_sequence = Some(sequence);
                true
            }
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.last_receive_time.elapsed() > self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn reset(&mut self) {
        self.send_sequence = 0;
        self.last_received_sequence = None;
        self.stats = NetworkStats::default();
        self.last_receive_time = Instant::now();
    }
}
