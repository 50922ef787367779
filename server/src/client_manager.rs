//! Connection tracking and per-client input queues.
//!
//! Inputs can arrive duplicated or out of order over UDP. Each client keeps
//! its pending inputs sorted by sequence number with duplicates removed, so
//! the game loop can drain them in the order they were produced.

use log::{info, warn};
use shared::InputSample;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Pending inputs kept per client before the oldest are discarded.
pub const MAX_PENDING_INPUTS: usize = 120;
/// Silence after which a client is dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    /// Highest input sequence applied by the simulation.
    pub last_processed_input: Option<u32>,
    /// Sorted by sequence number, no duplicates.
    pub pending_inputs: Vec<InputSample>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: None,
            pending_inputs: Vec::new(),
        }
    }

    /// Queues an input in sequence order. Returns false when the input was
    /// already processed or is already queued.
    pub fn add_input(&mut self, input: InputSample) -> bool {
        self.last_seen = Instant::now();

        if self
            .last_processed_input
            .is_some_and(|last| input.sequence_number <= last)
        {
            return false;
        }

        match self
            .pending_inputs
            .binary_search_by_key(&input.sequence_number, |i| i.sequence_number)
        {
            Ok(_) => false,
            Err(index) => {
                self.pending_inputs.insert(index, input);
                if self.pending_inputs.len() > MAX_PENDING_INPUTS {
                    let excess = self.pending_inputs.len() - MAX_PENDING_INPUTS;
                    warn!("Client {} input queue full, dropping {} oldest", self.id, excess);
                    self.pending_inputs.drain(..excess);
                }
                true
            }
        }
    }

    /// Removes and returns every queued input, oldest first.
    pub fn drain_inputs(&mut self) -> Vec<InputSample> {
        std::mem::take(&mut self.pending_inputs)
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Connected clients keyed by id, with their pending inputs.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Client IDs start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns `None` when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn client_addr(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Queues an input. False if the client is unknown or the input was
    /// already processed.
    pub fn add_input(&mut self, client_id: u32, input: InputSample) -> bool {
        self.clients
            .get_mut(&client_id)
            .is_some_and(|client| client.add_input(input))
    }

    /// Drains every client's queue. Inputs of one client stay in sequence
    /// order; clients are visited in ID order.
    pub fn drain_inputs(&mut self) -> Vec<(u32, Vec<InputSample>)> {
        let mut ids: Vec<u32> = self.clients.keys().copied().collect();
        ids.sort_unstable();

        ids.into_iter()
            .filter_map(|id| {
                let client = self.clients.get_mut(&id)?;
                let inputs = client.drain_inputs();
                (!inputs.is_empty()).then_some((id, inputs))
            })
            .collect()
    }

    /// Records the newest sequence applied for `client_id`.
    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = Some(
                client
                    .last_processed_input
                    .map_or(sequence, |last| last.max(sequence)),
            );
        }
    }

    pub fn last_processed_input(&self, client_id: u32) -> Option<u32> {
        self.clients
            .get(&client_id)
            .and_then(|client| client.last_processed_input)
    }

    /// Removes clients silent for longer than [`CLIENT_TIMEOUT`].
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn client_ids(&self) -> Vec<u32> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
