//! Types and simulation code compiled into both the client and the server.
//!
//! Everything that must behave identically on both sides of the connection
//! lives here: the kinematic data model, the movement model, the movement-mode
//! state machine, configuration and the wire protocol.

pub mod config;
pub mod mode;
pub mod movement;

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::{ConfigError, MovementSettings, PredictionConfig};
pub use mode::{ModeMachine, ModeTransition, MovementMode, StunRecovery};
pub use movement::advance;

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_TICK_RATE: u32 = 60;
pub const MAX_PACKET_SIZE: usize = 2048;

/// One tick of directional input, stamped by the owning client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSample {
    pub sequence_number: u32,
    pub movement: Vec2,
    pub timestamp: f64,
}

impl InputSample {
    /// Builds a sample, clamping `movement` to unit length.
    pub fn new(sequence_number: u32, movement: Vec2, timestamp: f64) -> Self {
        Self {
            sequence_number,
            movement: clamp_movement(movement),
            timestamp,
        }
    }
}

/// Kinematic snapshot produced by applying one [`InputSample`].
///
/// Predicted and authoritative states share this type; only their origin differs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub timestamp: f64,
    pub sequence_number: u32,
}

impl EntityState {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            timestamp: 0.0,
            sequence_number: 0,
        }
    }

    /// Positional error between two states.
    pub fn distance_to(&self, other: &EntityState) -> f32 {
        self.position.distance(other.position)
    }

    /// Copies position, orientation and velocity (and the stamp) from `other`.
    pub fn overwrite_kinematics(&mut self, other: &EntityState) {
        self.position = other.position;
        self.orientation = other.orientation;
        self.velocity = other.velocity;
        self.timestamp = other.timestamp;
        self.sequence_number = other.sequence_number;
    }
}

impl Default for EntityState {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

/// Clamps raw directional input into the unit disc.
///
/// Components are clamped to `[-1, 1]` first, then the magnitude to 1.
/// Non-finite components are treated as released. Clamping an already
/// clamped vector returns it bit for bit, so client and server agree no
/// matter how many times a sample passes through here.
pub fn clamp_movement(raw: Vec2) -> Vec2 {
    let x = if raw.x.is_finite() { raw.x.clamp(-1.0, 1.0) } else { 0.0 };
    let y = if raw.y.is_finite() { raw.y.clamp(-1.0, 1.0) } else { 0.0 };
    let movement = Vec2::new(x, y);

    let length_sq = movement.length_squared();
    if length_sq > 1.0 + MOVEMENT_CLAMP_SLACK {
        movement / length_sq.sqrt()
    } else {
        movement
    }
}

const MOVEMENT_CLAMP_SLACK: f32 = 1e-5;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("packet too large: {0} bytes")]
    TooLarge(usize),

    #[error("non-finite value in field `{0}`")]
    NonFinite(&'static str),

    #[error("orientation cannot be normalized")]
    InvalidOrientation,
}

/// Client to server: one stamped input.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct InputMessage {
    pub sequence_number: u32,
    pub movement: (f32, f32),
    pub timestamp: f32,
}

impl From<&InputSample> for InputMessage {
    fn from(input: &InputSample) -> Self {
        Self {
            sequence_number: input.sequence_number,
            movement: (input.movement.x, input.movement.y),
            timestamp: input.timestamp as f32,
        }
    }
}

impl From<InputMessage> for InputSample {
    /// Movement coming off the wire is untrusted and gets clamped here.
    fn from(msg: InputMessage) -> Self {
        let timestamp = if msg.timestamp.is_finite() {
            msg.timestamp as f64
        } else {
            0.0
        };
        InputSample::new(
            msg.sequence_number,
            Vec2::new(msg.movement.0, msg.movement.1),
            timestamp,
        )
    }
}

/// Server to client: the authoritative state produced by one input.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct StateAckMessage {
    pub position: (f32, f32, f32),
    pub orientation: (f32, f32, f32, f32),
    pub velocity: (f32, f32, f32),
    pub timestamp: f32,
    pub sequence_number: u32,
}

impl From<&EntityState> for StateAckMessage {
    fn from(state: &EntityState) -> Self {
        let q = state.orientation;
        Self {
            position: state.position.into(),
            orientation: (q.x, q.y, q.z, q.w),
            velocity: state.velocity.into(),
            timestamp: state.timestamp as f32,
            sequence_number: state.sequence_number,
        }
    }
}

impl TryFrom<StateAckMessage> for EntityState {
    type Error = ProtocolError;

    fn try_from(msg: StateAckMessage) -> Result<Self, Self::Error> {
        let position = Vec3::from(msg.position);
        let velocity = Vec3::from(msg.velocity);
        let (x, y, z, w) = msg.orientation;
        let orientation = Quat::from_xyzw(x, y, z, w);

        if !position.is_finite() {
            return Err(ProtocolError::NonFinite("position"));
        }
        if !velocity.is_finite() {
            return Err(ProtocolError::NonFinite("velocity"));
        }
        if !msg.timestamp.is_finite() {
            return Err(ProtocolError::NonFinite("timestamp"));
        }
        if !orientation.is_finite() || orientation.length_squared() < 1e-6 {
            return Err(ProtocolError::InvalidOrientation);
        }

        Ok(EntityState {
            position,
            orientation: orientation.normalize(),
            velocity,
            timestamp: msg.timestamp as f64,
            sequence_number: msg.sequence_number,
        })
    }
}

/// Gameplay events the server pushes to the owning client so its mode
/// machine mirrors the authoritative one.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum GameplayEvent {
    Stun { duration: f32 },
    ClearStun,
    PickUp,
    Drop,
    /// Replaces the entity's character-class speed modifier.
    SpeedModifier { modifier: f32 },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input(InputMessage),
    Disconnect,

    Connected {
        client_id: u32,
        spawn: StateAckMessage,
        settings: MovementSettings,
    },
    StateAck(StateAckMessage),
    Gameplay(GameplayEvent),
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Serializes with bincode, rejecting packets over `MAX_PACKET_SIZE`.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let data = bincode::serialize(self)?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::TooLarge(data.len()));
        }
        Ok(data)
    }

    pub fn decode(data: &[u8]) -> Result<Packet, ProtocolError> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::TooLarge(data.len()));
        }
        Ok(bincode::deserialize(data)?)
    }
}
