use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::protocol::{sequence_greater_than, TransformFrame};

/// Relay-side record of one connected client.
#[derive(Debug)]
pub struct Session {
    pub addr: SocketAddr,
    pub client_id: u32,
    pub joined: bool,
    /// Last frame seen from this client, replayed to late joiners so they
    /// can place the entity before its next batch arrives.
    pub last_frame: Option<TransformFrame>,
    pub last_receive_time: Instant,
    last_sequence: Option<u32>,
}

impl Session {
    pub fn new(addr: SocketAddr, client_id: u32) -> Self {
        Self {
            addr,
            client_id,
            joined: false,
            last_frame: None,
            last_receive_time: Instant::now(),
            last_sequence: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    /// Accepts only packets newer than anything seen from this client, so
    /// the frame stream forwarded downstream keeps its capture order even if
    /// the inbound link reorders.
    pub fn record_sequence(&mut self, sequence: u32) -> bool {
        match self.last_sequence {
            Some(last) if !sequence_greater_than(sequence, last) => false,
            _ => {
                self.last_sequence = Some(sequence);
                true
            }
        }
    }
}

#[derive(Debug)]
pub struct SessionManager {
    by_addr: HashMap<SocketAddr, u32>,
    sessions: HashMap<u32, Session>,
    next_client_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            by_addr: HashMap::new(),
            sessions: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    pub fn get_or_create(&mut self, addr: SocketAddr) -> Result<&mut Session, &'static str> {
        if let Some(&client_id) = self.by_addr.get(&addr) {
            return Ok(self.sessions.get_mut(&client_id).unwrap());
        }

        if self.sessions.len() >= self.max_clients {
            return Err("relay full");
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        self.sessions.insert(client_id, Session::new(addr, client_id));
        self.by_addr.insert(addr, client_id);

        Ok(self.sessions.get_mut(&client_id).unwrap())
    }

    pub fn get(&self, client_id: u32) -> Option<&Session> {
        self.sessions.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&client_id)
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&Session> {
        self.by_addr.get(addr).and_then(|id| self.sessions.get(id))
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut Session> {
        if let Some(&id) = self.by_addr.get(addr) {
            self.sessions.get_mut(&id)
        } else {
            None
        }
    }

    pub fn remove_by_addr(&mut self, addr: &SocketAddr) -> Option<Session> {
        if let Some(client_id) = self.by_addr.remove(addr) {
            self.sessions.remove(&client_id)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn joined(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.joined)
    }

    pub fn cleanup_timed_out(&mut self) -> Vec<Session> {
        let timed_out: Vec<SocketAddr> = self
            .sessions
            .values()
            .filter(|s| s.is_timed_out(self.timeout))
            .map(|s| s.addr)
            .collect();

        timed_out
            .iter()
            .filter_map(|addr| self.remove_by_addr(addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn joined_count(&self) -> usize {
        self.sessions.values().filter(|s| s.joined).count()
    }
}
