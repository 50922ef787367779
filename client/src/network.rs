//! Client UDP host driving a [`PredictedEntity`] at a fixed rate.

use crate::game::PredictedEntity;
use crate::input::InputPattern;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{
    EntityState, GameplayEvent, InputMessage, InputSample, Packet, PredictionConfig,
    MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, interval_at, sleep, Interval, MissedTickBehavior};

/// How often an unanswered connect request is repeated.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Reconnect timer whose first tick is one full period away, so it never
/// repeats the connect request `run` has just sent.
fn reconnect_interval() -> Interval {
    interval_at(
        tokio::time::Instant::now() + RECONNECT_INTERVAL,
        RECONNECT_INTERVAL,
    )
}

/// Link impairments applied on the client side of the socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkConditions {
    /// Added to each direction, in milliseconds, as half of this value.
    pub fake_ping_ms: u64,
    /// Probability in `[0, 1]` that an outgoing or incoming packet is dropped.
    pub packet_loss: f64,
}

impl LinkConditions {
    fn should_drop(&self) -> bool {
        self.packet_loss > 0.0 && rand::thread_rng().gen_bool(self.packet_loss.min(1.0))
    }
}

/// Headless UDP client driving one predicted entity from a scripted
/// input pattern.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,

    config: PredictionConfig,
    entity: Option<PredictedEntity>,
    pattern: InputPattern,
    link: LinkConditions,

    started: Instant,
    run_for: Option<Duration>,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        config: PredictionConfig,
        pattern: InputPattern,
        link: LinkConditions,
        run_for: Option<Duration>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            config,
            entity: None,
            pattern,
            link,
            started: Instant::now(),
            run_for,
        })
    }

    pub fn entity(&self) -> Option<&PredictedEntity> {
        self.entity.as_ref()
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.link.should_drop() {
            return Ok(());
        }

        if self.link.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.link.fake_ping_ms / 2)).await;
        }

        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                client_id,
                spawn,
                settings,
            } => {
                let spawn = match EntityState::try_from(spawn) {
                    Ok(spawn) => spawn,
                    Err(e) => {
                        error!("Rejected spawn state: {}", e);
                        return;
                    }
                };

                info!(
                    "Connected! Client ID: {} at ({:.2}, {:.2}, {:.2})",
                    client_id, spawn.position.x, spawn.position.y, spawn.position.z
                );
                self.client_id = Some(client_id);
                self.connected = true;

                let mut config = self.config.clone();
                config.movement = settings;
                match self.entity.as_mut() {
                    Some(entity) => {
                        entity.set_movement_settings(settings);
                        entity.reset(spawn);
                    }
                    None => self.entity = Some(PredictedEntity::new(config, spawn)),
                }
            }

            Packet::StateAck(message) => {
                let Some(entity) = self.entity.as_mut() else {
                    return;
                };

                match EntityState::try_from(message) {
                    Ok(state) => {
                        let outcome = entity.on_authoritative_state(&state);
                        debug!("Ack {}: {:?}", state.sequence_number, outcome);
                    }
                    Err(e) => warn!("Dropping malformed state ack: {}", e),
                }
            }

            Packet::Gameplay(event) => {
                let Some(entity) = self.entity.as_mut() else {
                    return;
                };

                info!("Gameplay event: {:?}", event);
                match event {
                    GameplayEvent::Stun { duration } => {
                        entity.stun(duration);
                    }
                    GameplayEvent::ClearStun => {
                        entity.clear_stun();
                    }
                    GameplayEvent::PickUp => entity.set_carrying(true),
                    GameplayEvent::Drop => entity.set_carrying(false),
                    GameplayEvent::SpeedModifier { modifier } => {
                        entity.set_movement_speed_modifier(modifier);
                    }
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
                self.entity = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    async fn tick(&mut self, dt: f32) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }
        let Some(entity) = self.entity.as_mut() else {
            return Ok(());
        };

        let elapsed = self.started.elapsed().as_secs_f64();
        entity.set_raw_input(self.pattern.sample(elapsed));

        let mut outbox: Vec<InputSample> = Vec::with_capacity(1);
        entity.tick(dt, &mut outbox);

        for input in &outbox {
            self.send_packet(&Packet::Input(InputMessage::from(input)))
                .await?;
        }

        Ok(())
    }

    fn log_status(&self) {
        if let Some(entity) = &self.entity {
            let position = entity.state().position;
            info!(
                "pos ({:.2}, {:.2}) mode {:?} | {}",
                position.x,
                position.z,
                entity.mode(),
                entity.debug_info().replace('\n', ", ")
            );
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let dt = self.config.fixed_dt();
        let mut tick_interval = interval(Duration::from_secs_f32(dt));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut status_interval = interval(Duration::from_secs(1));
        let mut connect_interval = reconnect_interval();

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            if self
                .run_for
                .is_some_and(|limit| self.started.elapsed() >= limit)
            {
                break;
            }

            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.link.should_drop() {
                                continue;
                            }
                            if self.link.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.link.fake_ping_ms / 2)).await;
                            }

                            match Packet::decode(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to decode packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    if let Err(e) = self.tick(dt).await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = connect_interval.tick() => {
                    // Connect requests are datagrams too and may be lost.
                    if !self.connected {
                        self.connect().await?;
                    }
                },

                _ = status_interval.tick() => {
                    self.log_status();
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, disconnecting");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }
        self.log_status();

        Ok(())
    }
}
