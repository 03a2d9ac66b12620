//! Server network layer handling UDP communications and the tick driver

use crate::client_manager::{ClientManager, CommandError};
use crate::game::{CommandEffect, GameCommand, World};
use crate::utils::get_timestamp;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientPacket, GameConfig, ServerPacket, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Largest datagram we expect from a client.
const RECV_BUFFER_SIZE: usize = 2048;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: ClientPacket,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
    },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: ServerPacket,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: ServerPacket,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and game simulation
///
/// The world lives inside the server loop and is only touched from it, so
/// ticks never overlap and commands are applied strictly between ticks.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    /// Validated commands waiting for the next tick.
    pending: Vec<GameCommand>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        world: World,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let config = world.config();
        let clients = ClientManager::new(
            max_clients,
            config.tick_duration(),
            config.boost_toggle_interval(),
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(clients)),
            world,
            pending: Vec::new(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Returns a handle that can stop [`Server::run`] between ticks.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    fn config(&self) -> &GameConfig {
        self.world.config()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<ClientPacket>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast: {}", e);
                                continue;
                            }
                        };
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &ServerPacket,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: ServerPacket, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: ServerPacket, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Answers a rejected request. Silent kinds only reach the debug log.
    fn reject(&self, error: CommandError, addr: SocketAddr) {
        if error.is_silent() {
            debug!("Dropped input from {}: {}", addr, error);
            return;
        }
        warn!("Rejected request from {}: {}", addr, error);
        let packet = match error {
            CommandError::ServerFull => ServerPacket::Disconnected {
                reason: error.to_string(),
            },
            _ => ServerPacket::Rejected {
                reason: error.to_string(),
            },
        };
        self.send_packet(packet, addr);
    }

    /// Validates an incoming packet and queues the resulting command
    async fn handle_packet(&mut self, packet: ClientPacket, addr: SocketAddr) {
        let now = Instant::now();
        let mut clients = self.clients.write().await;

        let client_id = match clients.find_client_by_addr(addr) {
            Some(id) => id,
            None if matches!(packet, ClientPacket::Join { .. }) => {
                match clients.add_client(addr) {
                    Ok(id) => id,
                    Err(e) => {
                        drop(clients);
                        self.reject(e, addr);
                        return;
                    }
                }
            }
            None => {
                drop(clients);
                self.reject(CommandError::NotConnected, addr);
                return;
            }
        };
        clients.touch(client_id, now);

        let leaving = matches!(packet, ClientPacket::Leave);
        let result = clients.validate(client_id, packet, now);
        if leaving {
            clients.remove_client(&client_id);
        }
        drop(clients);

        match result {
            Ok(Some(command)) => self.pending.push(command),
            Ok(None) => {}
            Err(e) => self.reject(e, addr),
        }
    }

    /// Applies queued commands and answers joins
    async fn apply_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let commands = std::mem::take(&mut self.pending);
        let clients = self.clients.read().await;
        for command in commands {
            let joining = match &command {
                GameCommand::Join { id, .. } => Some(*id),
                _ => None,
            };

            match (self.world.apply_command(command), joining) {
                (CommandEffect::Joined { id, .. }, _) => {
                    if let Some(addr) = clients.addr_of(id) {
                        let config = self.config();
                        self.send_packet(
                            ServerPacket::Joined {
                                player_id: id,
                                world_size: config.world_size,
                                tick_rate: config.tick_rate,
                            },
                            addr,
                        );
                    }
                }
                (CommandEffect::Ignored, Some(id)) => {
                    if let Some(addr) = clients.addr_of(id) {
                        self.reject(CommandError::AlreadyPlaying, addr);
                    }
                }
                _ => {}
            }
        }
    }

    /// Runs one simulation step and ships its results
    async fn run_tick(&mut self, dt: Duration) {
        self.apply_pending().await;

        let started = Instant::now();
        let outcome = self.world.tick(dt, get_timestamp());
        let elapsed = started.elapsed();

        if !outcome.deaths.is_empty() {
            let clients = self.clients.read().await;
            for notice in outcome.deaths {
                if let Some(addr) = clients.addr_of(notice.player_id) {
                    self.send_packet(ServerPacket::Died(notice), addr);
                }
            }
        }

        for part in outcome.delta.into_parts(MAX_DATAGRAM_SIZE) {
            self.broadcast_packet(ServerPacket::State(part), None);
        }

        // Periodic performance monitoring
        let tick = self.world.tick_count();
        if tick % 300 == 0 {
            debug!(
                "Tick {} ({:.1}s simulated): {} creatures, {} food, {:.2}ms",
                tick,
                self.world.clock().as_secs_f64(),
                self.world.creature_count(),
                self.world.food().len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let tick_duration = self.config().tick_duration();
        // Cap the delta time at four frames
        let max_delta = tick_duration * 4;

        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!(
            "Server started at {} ticks per second",
            self.config().tick_rate
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.pending.push(GameCommand::Disconnect { id: client_id });
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let mut dt = now.duration_since(last_tick);
                    last_tick = now;

                    if dt > max_delta {
                        warn!(
                            "Large delta time detected ({:.3}s), capping to {:.3}s",
                            dt.as_secs_f32(),
                            max_delta.as_secs_f32()
                        );
                        dt = max_delta;
                    }

                    self.run_tick(dt).await;
                },
            }
        }

        Ok(())
    }
}
