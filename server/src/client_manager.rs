//! Client connection management and input validation for the arena server
//!
//! This module is the boundary between untrusted datagrams and the
//! simulation. It handles:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Per-client rate limiting of heading and boost input
//! - Validation of client packets into [`GameCommand`]s
//! - Client capacity management and address tracking
//!
//! Nothing here touches the world. Accepted commands are queued by the
//! network layer and applied between ticks.

use crate::game::GameCommand;
use crate::utils::sanitize_name;
use log::info;
use shared::ClientPacket;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a client may stay silent before it is dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasons a client request is not turned into a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not connected, send Join first")]
    NotConnected,
    #[error("already playing")]
    AlreadyPlaying,
    #[error("server full")]
    ServerFull,
    #[error("rate limited")]
    RateLimited,
    #[error("heading is not a finite number")]
    InvalidHeading,
}

impl CommandError {
    /// Silent errors are dropped without telling the client.
    pub fn is_silent(&self) -> bool {
        matches!(self, CommandError::RateLimited | CommandError::InvalidHeading)
    }
}

/// Represents a connected client and its input pacing state
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server, also the creature id
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// When the last heading update was accepted
    pub last_heading_at: Option<Instant>,
    /// When the last boost toggle was accepted
    pub last_boost_at: Option<Instant>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_heading_at: None,
            last_boost_at: None,
        }
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Returns true and records `now` if at least `interval` passed since `last`.
fn admit(last: &mut Option<Instant>, now: Instant, interval: Duration) -> bool {
    if let Some(previous) = *last {
        if now.saturating_duration_since(previous) < interval {
            return false;
        }
    }
    *last = Some(now);
    true
}

/// Manages all connected clients and turns their packets into commands
///
/// Excess input is dropped rather than queued, which bounds the work any
/// single client can push into a tick.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    heading_interval: Duration,
    boost_interval: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the given capacity and input pacing
    pub fn new(max_clients: usize, heading_interval: Duration, boost_interval: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            heading_interval,
            boost_interval,
        }
    }

    /// Attempts to add a new client connection
    pub fn add_client(&mut self, addr: SocketAddr) -> Result<u32, CommandError> {
        if self.clients.len() >= self.max_clients {
            return Err(CommandError::ServerFull);
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Ok(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Marks the client as alive
    pub fn touch(&mut self, client_id: u32, now: Instant) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = now;
        }
    }

    /// Validates a packet from a known client into a simulation command
    ///
    /// `Ok(None)` means the packet was fine but needs no simulation work.
    pub fn validate(
        &mut self,
        client_id: u32,
        packet: ClientPacket,
        now: Instant,
    ) -> Result<Option<GameCommand>, CommandError> {
        let heading_interval = self.heading_interval;
        let boost_interval = self.boost_interval;
        let client = self
            .clients
            .get_mut(&client_id)
            .ok_or(CommandError::NotConnected)?;

        match packet {
            ClientPacket::Join { name } => Ok(Some(GameCommand::Join {
                id: client_id,
                name: sanitize_name(name.as_deref()),
            })),
            ClientPacket::SetHeading { angle } => {
                if !angle.is_finite() {
                    return Err(CommandError::InvalidHeading);
                }
                if !admit(&mut client.last_heading_at, now, heading_interval) {
                    return Err(CommandError::RateLimited);
                }
                Ok(Some(GameCommand::SetHeading {
                    id: client_id,
                    angle,
                }))
            }
            ClientPacket::SetBoost { boosting } => {
                if !admit(&mut client.last_boost_at, now, boost_interval) {
                    return Err(CommandError::RateLimited);
                }
                Ok(Some(GameCommand::SetBoost {
                    id: client_id,
                    boosting,
                }))
            }
            ClientPacket::Heartbeat => Ok(None),
            ClientPacket::Leave => Ok(Some(GameCommand::Disconnect { id: client_id })),
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed client IDs so their creatures can be cleaned up.
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

    /// Gets all client IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADING: Duration = Duration::from_millis(33);
    const BOOST: Duration = Duration::from_millis(100);

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn manager(max_clients: usize) -> ClientManager {
        ClientManager::new(max_clients, HEADING, BOOST)
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = manager(3);
        assert!(manager.is_empty());

        assert_eq!(manager.add_client(test_addr()), Ok(1));
        assert_eq!(manager.add_client(test_addr2()), Ok(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = manager(1);
        assert!(manager.add_client(test_addr()).is_ok());
        assert_eq!(
            manager.add_client(test_addr2()),
            Err(CommandError::ServerFull)
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = manager(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(!manager.remove_client(&client_id));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = manager(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));
        assert_eq!(manager.addr_of(client_id2), Some(test_addr2()));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_join_sanitizes_name() {
        let mut manager = manager(2);
        let id = manager.add_client(test_addr()).unwrap();

        let command = manager
            .validate(id, ClientPacket::Join { name: None }, Instant::now())
            .unwrap();
        assert_eq!(
            command,
            Some(GameCommand::Join {
                id,
                name: "Anonymous".to_string()
            })
        );
    }

    #[test]
    fn test_heading_rejects_nan() {
        let mut manager = manager(2);
        let id = manager.add_client(test_addr()).unwrap();

        let result = manager.validate(id, ClientPacket::SetHeading { angle: f32::NAN }, Instant::now());
        assert_eq!(result, Err(CommandError::InvalidHeading));
        assert!(CommandError::InvalidHeading.is_silent());
    }

    #[test]
    fn test_heading_rate_limit() {
        let mut manager = manager(2);
        let id = manager.add_client(test_addr()).unwrap();
        let start = Instant::now();

        let packet = |angle| ClientPacket::SetHeading { angle };
        assert!(manager.validate(id, packet(1.0), start).is_ok());
        assert_eq!(
            manager.validate(id, packet(1.5), start + Duration::from_millis(10)),
            Err(CommandError::RateLimited)
        );
        assert_eq!(
            manager.validate(id, packet(2.0), start + HEADING),
            Ok(Some(GameCommand::SetHeading { id, angle: 2.0 }))
        );
    }

    #[test]
    fn test_boost_rate_limit_is_per_client() {
        let mut manager = manager(2);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();
        let start = Instant::now();
        let boost = ClientPacket::SetBoost { boosting: true };

        assert!(manager.validate(a, boost.clone(), start).is_ok());
        assert_eq!(
            manager.validate(a, boost.clone(), start + Duration::from_millis(50)),
            Err(CommandError::RateLimited)
        );
        assert!(manager.validate(b, boost.clone(), start + Duration::from_millis(50)).is_ok());
        assert!(manager.validate(a, boost, start + BOOST).is_ok());
    }

    #[test]
    fn test_heartbeat_and_leave() {
        let mut manager = manager(2);
        let id = manager.add_client(test_addr()).unwrap();
        let now = Instant::now();

        assert_eq!(manager.validate(id, ClientPacket::Heartbeat, now), Ok(None));
        assert_eq!(
            manager.validate(id, ClientPacket::Leave, now),
            Ok(Some(GameCommand::Disconnect { id }))
        );
    }

    #[test]
    fn test_unknown_client_is_not_connected() {
        let mut manager = manager(2);
        let result = manager.validate(42, ClientPacket::Heartbeat, Instant::now());
        assert_eq!(result, Err(CommandError::NotConnected));
        assert!(!CommandError::NotConnected.is_silent());
    }

    #[test]
    fn test_check_timeouts_removes_stale_clients() {
        let mut manager = manager(2);
        let stale = manager.add_client(test_addr()).unwrap();
        let fresh = manager.add_client(test_addr2()).unwrap();
        manager.clients.get_mut(&stale).unwrap().last_seen =
            Instant::now() - CLIENT_TIMEOUT - Duration::from_secs(1);

        assert_eq!(manager.check_timeouts(), vec![stale]);
        assert_eq!(manager.get_client_addrs(), vec![(fresh, test_addr2())]);
    }
}
