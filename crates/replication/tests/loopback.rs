use std::net::SocketAddr;
use std::time::{Duration, Instant};

use glam::{DQuat, DVec3};

use netpose::{
    ClientEvent, InterpolationConfig, Message, NetworkEndpoint, Packet, PacketHeader,
    RelayClient, ReplicationReceiver, ReplicationSink, SessionManager, TransformEvent,
    TransformFrame, Clock, FrameTransport,
};

#[derive(Default)]
struct NullSink {
    joined: Vec<u32>,
    poses: u64,
}

impl ReplicationSink for NullSink {
    fn entity_joined(&mut self, id: u32, _frame: &TransformFrame) {
        self.joined.push(id);
    }

    fn entity_left(&mut self, _id: u32) {}

    fn pose(&mut self, _id: u32, _position: DVec3, _rotation: DQuat) {
        self.poses += 1;
    }

    fn event(&mut self, _id: u32, _event: TransformEvent) {}
}

fn frame(timestamp: f64, x: f64) -> TransformFrame {
    TransformFrame::new(
        DVec3::new(x, 0.0, 0.0),
        DQuat::IDENTITY,
        TransformEvent::None,
        timestamp,
    )
}

/// Minimal in-test relay: enough of the server loop to welcome a client,
/// answer its time-sync requests, and accept a world join.
struct TestRelay {
    endpoint: NetworkEndpoint,
    sessions: SessionManager,
    started: Instant,
}

impl TestRelay {
    fn new() -> Self {
        let mut endpoint = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        endpoint.set_server_mode(true);
        Self {
            endpoint,
            sessions: SessionManager::new(8, Duration::from_secs(10)),
            started: Instant::now(),
        }
    }

    fn addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    fn pump(&mut self) {
        for (packet, addr) in self.endpoint.receive().unwrap() {
            if let Some(session) = self.sessions.get_by_addr_mut(&addr) {
                if !session.record_sequence(packet.header.sequence) {
                    continue;
                }
                session.touch();
            }

            match packet.payload {
                Message::Hello => {
                    let client_id = self.sessions.get_or_create(addr).unwrap().client_id;
                    let reply = self.endpoint.create_packet(Message::Welcome { client_id });
                    self.endpoint.send_to(&reply, addr).unwrap();
                }
                Message::TimeSync { client_time } => {
                    let reply = self.endpoint.create_packet(Message::TimeSyncReply {
                        client_time,
                        server_time: self.started.elapsed().as_secs_f64(),
                    });
                    self.endpoint.send_to(&reply, addr).unwrap();
                }
                Message::JoinWorld { frame } => {
                    let session = self.sessions.get_by_addr_mut(&addr).unwrap();
                    session.joined = true;
                    session.last_frame = Some(frame);
                    let reply = self
                        .endpoint
                        .create_packet(Message::JoinResult { success: true });
                    self.endpoint.send_to(&reply, addr).unwrap();
                }
                _ => {}
            }
        }
    }

    fn send(&mut self, message: Message, addr: SocketAddr) {
        let packet = self.endpoint.create_packet(message);
        self.endpoint.send_to(&packet, addr).unwrap();
    }
}

fn pump_until<F: FnMut(&RelayClient, &[ClientEvent]) -> bool>(
    relay: &mut TestRelay,
    client: &mut RelayClient,
    receiver: &ReplicationReceiver,
    timeout_ms: u64,
    mut done: F,
) -> bool {
    let handle = receiver.handle();
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        relay.pump();
        let events = client.poll(&handle).unwrap();
        if done(client, &events) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn client_connects_synchronizes_and_joins() {
    let mut relay = TestRelay::new();
    let mut client = RelayClient::new().unwrap();
    let receiver = ReplicationReceiver::new(InterpolationConfig::default());

    client.connect(relay.addr()).unwrap();

    let connected = pump_until(&mut relay, &mut client, &receiver, 2000, |_, events| {
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::Connected { .. }))
    });
    assert!(connected);
    assert!(client.is_connected());
    assert!(client.client_id().is_some());

    let synchronized = pump_until(&mut relay, &mut client, &receiver, 3000, |client, _| {
        client.clock().is_synchronized()
    });
    assert!(synchronized);

    // relay epoch just started, so synchronized time should sit near it
    let now = client.clock().now();
    assert!(now >= 0.0 && now < 10.0);

    let join_frame = frame(client.clock().now(), 0.0);
    client.join_world(join_frame).unwrap();

    let joined = pump_until(&mut relay, &mut client, &receiver, 2000, |_, events| {
        events
            .iter()
            .any(|e| matches!(e, ClientEvent::JoinResult { success: true }))
    });
    assert!(joined);
    assert!(client.has_joined());
    assert!(client.is_connected());
}

#[test]
fn remote_traffic_reaches_the_sink() {
    let mut relay = TestRelay::new();
    let mut client = RelayClient::new().unwrap();
    let mut receiver = ReplicationReceiver::new(InterpolationConfig::default());
    let mut sink = NullSink::default();

    client.connect(relay.addr()).unwrap();
    assert!(pump_until(&mut relay, &mut client, &receiver, 2000, |client, _| {
        client.is_connected() && client.clock().is_synchronized()
    }));

    let client_addr = client.local_addr();
    let server_now = relay.started.elapsed().as_secs_f64();

    // a peer joins and streams a pair of frames spanning playback time
    relay.send(
        Message::ClientJoined {
            client_id: 42,
            frame: frame(server_now, 0.0),
        },
        client_addr,
    );
    relay.send(
        Message::ClientFrames {
            client_id: 42,
            frames: vec![frame(server_now - 2.0, 0.0), frame(server_now + 60.0, 10.0)],
        },
        client_addr,
    );

    let handle = receiver.handle();
    let start = Instant::now();
    let mut got_pose = false;
    while start.elapsed() < Duration::from_millis(2000) && !got_pose {
        relay.pump();
        client.poll(&handle).unwrap();
        receiver.tick(client.clock(), &mut sink);
        got_pose = sink.poses > 0;
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(sink.joined, vec![42]);
    assert!(got_pose);
}

#[test]
fn frame_batches_travel_client_to_relay() {
    let mut relay = TestRelay::new();
    let mut client = RelayClient::new().unwrap();
    let receiver = ReplicationReceiver::new(InterpolationConfig::default());

    client.connect(relay.addr()).unwrap();
    assert!(pump_until(&mut relay, &mut client, &receiver, 2000, |client, _| {
        client.is_connected() && client.clock().is_synchronized()
    }));

    client.join_world(frame(client.clock().now(), 0.0)).unwrap();
    assert!(pump_until(&mut relay, &mut client, &receiver, 2000, |client, _| {
        client.has_joined()
    }));

    let batch = vec![
        frame(client.clock().now(), 1.0),
        frame(client.clock().now() + 0.1, 2.0),
    ];
    client.send_batch(&batch).unwrap();

    let start = Instant::now();
    let mut received = Vec::new();
    while start.elapsed() < Duration::from_millis(2000) && received.is_empty() {
        for (packet, _addr) in relay.endpoint.receive().unwrap() {
            if let Message::FrameBatch { frames } = packet.payload {
                received = frames;
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(received.len(), 2);
    assert_eq!(received[0].x, 1.0);
    assert_eq!(received[1].x, 2.0);
    assert!(received[1].timestamp > received[0].timestamp);
}

#[test]
fn out_of_order_packets_are_dropped_client_side() {
    let mut sender = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
    let mut receiver_ep = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
    let target = receiver_ep.local_addr();

    let newer = Packet::new(PacketHeader::new(10), Message::Hello);
    let older = Packet::new(PacketHeader::new(5), Message::Hello);
    sender.send_to(&newer, target).unwrap();
    sender.send_to(&older, target).unwrap();

    let start = Instant::now();
    let mut accepted = Vec::new();
    while start.elapsed() < Duration::from_millis(500) {
        for (packet, _) in receiver_ep.receive().unwrap() {
            accepted.push(packet.header.sequence);
        }
        if !accepted.is_empty() && start.elapsed() > Duration::from_millis(100) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(accepted, vec![10]);
}
