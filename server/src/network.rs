//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::{
    GameplayEvent, InputSample, MovementSettings, Packet, StateAckMessage, StunRecovery,
    DEFAULT_TICK_RATE, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Periodic gameplay events pushed onto every player. Intervals are in ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameplaySchedule {
    pub stun_every: Option<u32>,
    pub stun_duration: f32,
    pub carry_every: Option<u32>,
}

impl Default for GameplaySchedule {
    fn default() -> Self {
        Self {
            stun_every: None,
            stun_duration: 1.0,
            carry_every: None,
        }
    }
}

impl GameplaySchedule {
    fn due(every: Option<u32>, tick: u32) -> bool {
        every.is_some_and(|n| n > 0 && tick > 0 && tick % n == 0)
    }

    pub fn stun_due(&self, tick: u32) -> bool {
        Self::due(self.stun_every, tick)
    }

    pub fn carry_due(&self, tick: u32) -> bool {
        Self::due(self.carry_every, tick)
    }
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Simulation rate in Hz. One input is applied per `1 / tick_rate` seconds.
    pub tick_rate: u32,
    pub max_clients: usize,
    pub settings: MovementSettings,
    pub stun_recovery: StunRecovery,
    pub schedule: GameplaySchedule,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_clients: 32,
            settings: MovementSettings::default(),
            stun_recovery: StunRecovery::default(),
            schedule: GameplaySchedule::default(),
        }
    }
}

impl ServerOptions {
    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    schedule: GameplaySchedule,
    tick_rate: u32,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        options: ServerOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        options.settings.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(options.max_clients))),
            game_state: GameState::new(
                options.settings,
                options.fixed_dt(),
                options.stun_recovery,
            ),
            schedule: options.schedule,
            tick_rate: options.tick_rate.max(1),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop [`Server::run`] with [`ServerMessage::Shutdown`].
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Read access to the authoritative world.
    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[0..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

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
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&existing_id);
                    self.game_state.remove_player(&existing_id);
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match client_id {
                    Some(client_id) => {
                        let spawn = self.game_state.add_player(client_id);
                        let response = Packet::Connected {
                            client_id,
                            spawn: StateAckMessage::from(&spawn),
                            settings: *self.game_state.settings(),
                        };
                        self.send_packet(response, addr);
                    }
                    None => {
                        let response = Packet::Disconnected {
                            reason: "Server full".to_string(),
                        };
                        self.send_packet(response, addr);
                    }
                }
            }

            Packet::Input(message) => {
                let mut clients = self.clients.write().await;
                if let Some(client_id) = clients.find_client_by_addr(addr) {
                    if !clients.add_input(client_id, InputSample::from(message)) {
                        debug!(
                            "Ignoring stale input {} from client {}",
                            message.sequence_number, client_id
                        );
                    }
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                    self.game_state.remove_player(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies every queued input one fixed step at a time and answers each
    /// client with the state produced by its newest input.
    async fn process_inputs(&mut self) {
        let drained = {
            let mut clients = self.clients.write().await;
            clients.drain_inputs()
        };

        for (client_id, inputs) in drained {
            let newest = inputs
                .iter()
                .filter_map(|input| self.game_state.apply_input(client_id, input))
                .last();

            let Some(state) = newest else {
                continue;
            };

            let addr = {
                let mut clients = self.clients.write().await;
                clients.mark_input_processed(client_id, state.sequence_number);
                clients.client_addr(client_id)
            };

            if let Some(addr) = addr {
                self.send_packet(Packet::StateAck(StateAckMessage::from(&state)), addr);
            }
        }
    }

    /// Pushes scheduled stun and carry events onto every player.
    async fn apply_gameplay_schedule(&mut self) {
        let tick = self.game_state.tick;
        let stun = self.schedule.stun_due(tick);
        let carry = self.schedule.carry_due(tick);
        if !stun && !carry {
            return;
        }

        let targets: Vec<(u32, SocketAddr)> = {
            let clients = self.clients.read().await;
            clients
                .client_ids()
                .into_iter()
                .filter_map(|id| clients.client_addr(id).map(|addr| (id, addr)))
                .collect()
        };

        for (client_id, addr) in targets {
            if stun && self.game_state.stun(client_id, self.schedule.stun_duration) {
                let event = GameplayEvent::Stun {
                    duration: self.schedule.stun_duration,
                };
                debug!("Stunning client {}", client_id);
                self.send_packet(Packet::Gameplay(event), addr);
            }

            if carry {
                if let Some(carrying) = self.game_state.toggle_carrying(client_id) {
                    let event = if carrying {
                        GameplayEvent::PickUp
                    } else {
                        GameplayEvent::Drop
                    };
                    debug!("Client {}: {:?}", client_id, event);
                    self.send_packet(Packet::Gameplay(event), addr);
                }
            }
        }
    }

    /// Changes one player's speed modifier and mirrors it to that client.
    pub async fn set_speed_modifier(&mut self, client_id: u32, modifier: f32) -> bool {
        let addr = {
            let clients = self.clients.read().await;
            clients.client_addr(client_id)
        };
        let Some(addr) = addr else {
            return false;
        };
        if !self.game_state.set_speed_modifier(client_id, modifier) {
            return false;
        }

        debug!("Client {}: speed modifier {}", client_id, modifier);
        self.send_packet(
            Packet::Gameplay(GameplayEvent::SpeedModifier { modifier }),
            addr,
        );
        true
    }

    async fn tick(&mut self) {
        self.process_inputs().await;
        self.game_state.tick += 1;
        self.apply_gameplay_schedule().await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(Duration::from_secs_f32(self.game_state.fixed_dt()));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.game_state.remove_player(&client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick().await;

                    if self.game_state.tick % self.tick_rate == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!("Tick {}: {} clients", self.game_state.tick, client_count);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::EntityState;
    use tokio_test::assert_ok;

    fn client_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn test_server(options: ServerOptions) -> Server {
        assert_ok!(Server::new("127.0.0.1:0", options).await)
    }

    fn next_packet(server: &mut Server) -> Packet {
        match server.game_rx.try_recv() {
            Ok(GameMessage::SendPacket { packet, .. }) => packet,
            Err(e) => panic!("No packet queued: {}", e),
        }
    }

    async fn connect(server: &mut Server) -> u32 {
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                client_addr(),
            )
            .await;

        match next_packet(server) {
            Packet::Connected { client_id, .. } => client_id,
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    fn input_packet(sequence: u32) -> Packet {
        Packet::Input(shared::InputMessage {
            sequence_number: sequence,
            movement: (1.0, 0.0),
            timestamp: 0.0,
        })
    }

    #[test]
    fn test_gameplay_schedule_due() {
        let schedule = GameplaySchedule {
            stun_every: Some(60),
            carry_every: Some(0),
            ..Default::default()
        };

        assert!(!schedule.stun_due(0));
        assert!(!schedule.stun_due(59));
        assert!(schedule.stun_due(60));
        assert!(schedule.stun_due(120));
        assert!(!schedule.carry_due(60));
        assert!(!GameplaySchedule::default().stun_due(60));
    }

    #[test]
    fn test_options_fixed_dt() {
        let options = ServerOptions {
            tick_rate: 30,
            ..Default::default()
        };
        assert_eq!(options.fixed_dt(), 1.0 / 30.0);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let options = ServerOptions {
            settings: MovementSettings {
                base_movement_speed: -1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(Server::new("127.0.0.1:0", options).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_spawns_player() {
        let mut server = test_server(ServerOptions::default()).await;
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                client_addr(),
            )
            .await;

        match next_packet(&mut server) {
            Packet::Connected {
                client_id,
                spawn,
                settings,
            } => {
                let spawn = assert_ok!(EntityState::try_from(spawn));
                assert_eq!(spawn.position, GameState::spawn_point(client_id));
                assert_eq!(settings, MovementSettings::default());
                assert!(server.game_state().player_state(client_id).is_some());
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let mut server = test_server(ServerOptions::default()).await;
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION + 1,
                },
                client_addr(),
            )
            .await;

        assert!(matches!(
            next_packet(&mut server),
            Packet::Disconnected { .. }
        ));
        assert!(server.game_state().players.is_empty());
    }

    #[tokio::test]
    async fn test_server_full() {
        let mut server = test_server(ServerOptions {
            max_clients: 1,
            ..Default::default()
        })
        .await;
        connect(&mut server).await;

        let other: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                other,
            )
            .await;

        match next_packet(&mut server) {
            Packet::Disconnected { reason } => assert_eq!(reason, "Server full"),
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inputs_processed_in_sequence_order() {
        let mut server = test_server(ServerOptions::default()).await;
        let client_id = connect(&mut server).await;

        server.handle_packet(input_packet(1), client_addr()).await;
        server.handle_packet(input_packet(0), client_addr()).await;
        server.handle_packet(input_packet(1), client_addr()).await;
        server.tick().await;

        match next_packet(&mut server) {
            Packet::StateAck(ack) => assert_eq!(ack.sequence_number, 1),
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert!(server.game_rx.try_recv().is_err());

        let spawn = GameState::spawn_point(client_id);
        let state = server.game_state().player_state(client_id).unwrap();
        let expected = 2.0 * MovementSettings::default().movement_speed() / 60.0;
        assert_approx_eq!(state.position.x - spawn.x, expected, 1e-5);

        // Late duplicate of an already processed input.
        server.handle_packet(input_packet(0), client_addr()).await;
        server.tick().await;
        assert!(server.game_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let mut server = test_server(ServerOptions::default()).await;
        let client_id = connect(&mut server).await;

        server.handle_packet(Packet::Disconnect, client_addr()).await;
        assert!(server.game_state().player_state(client_id).is_none());
    }

    #[tokio::test]
    async fn test_scheduled_stun_is_announced() {
        let mut server = test_server(ServerOptions {
            schedule: GameplaySchedule {
                stun_every: Some(1),
                stun_duration: 0.5,
                carry_every: None,
            },
            ..Default::default()
        })
        .await;
        let client_id = connect(&mut server).await;

        server.tick().await;

        match next_packet(&mut server) {
            Packet::Gameplay(GameplayEvent::Stun { duration }) => assert_eq!(duration, 0.5),
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert_eq!(
            server.game_state().players[&client_id].mode(),
            shared::MovementMode::Stunned
        );
    }

    #[tokio::test]
    async fn test_scheduled_carry_toggles() {
        let mut server = test_server(ServerOptions {
            schedule: GameplaySchedule {
                carry_every: Some(1),
                ..Default::default()
            },
            ..Default::default()
        })
        .await;
        connect(&mut server).await;

        server.tick().await;
        assert!(matches!(
            next_packet(&mut server),
            Packet::Gameplay(GameplayEvent::PickUp)
        ));

        server.tick().await;
        assert!(matches!(
            next_packet(&mut server),
            Packet::Gameplay(GameplayEvent::Drop)
        ));
    }

    #[tokio::test]
    async fn test_speed_modifier_is_announced() {
        let mut server = test_server(ServerOptions::default()).await;
        let client_id = connect(&mut server).await;

        assert!(server.set_speed_modifier(client_id, 1.5).await);
        match next_packet(&mut server) {
            Packet::Gameplay(GameplayEvent::SpeedModifier { modifier }) => {
                assert_eq!(modifier, 1.5)
            }
            other => panic!("Unexpected packet: {:?}", other),
        }

        assert!(!server.set_speed_modifier(client_id, 0.0).await);
        assert!(!server.set_speed_modifier(client_id + 1, 1.5).await);
        assert!(server.game_rx.try_recv().is_err());
    }
}
