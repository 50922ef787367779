//! Tunables consumed by the prediction core.
//!
//! `MovementSettings` must be identical on both sides of a connection; the
//! server sends its copy to every client when it connects.

use crate::mode::StunRecovery;
use crate::DEFAULT_TICK_RATE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_INPUT_HISTORY: usize = 60;
pub const DEFAULT_RECONCILIATION_THRESHOLD: f32 = 0.1;
pub const DEFAULT_INPUT_SMOOTH_TIME: f32 = 0.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("max input history size must be at least 1")]
    EmptyHistory,

    #[error("tick rate must be at least 1 Hz")]
    ZeroTickRate,

    #[error("reconciliation threshold must be a non-negative number, got {0}")]
    InvalidThreshold(f32),

    #[error("input smooth time must be a positive number, got {0}")]
    InvalidSmoothTime(f32),

    #[error("{name} must be a positive number, got {value}")]
    NonPositive { name: &'static str, value: f32 },

    #[error("carrying speed multiplier must be in (0, 1), got {0}")]
    InvalidCarryingMultiplier(f32),
}

/// Movement model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementSettings {
    pub base_movement_speed: f32,
    /// Maximum turn rate in radians per second.
    pub rotation_speed: f32,
    pub carrying_speed_multiplier: f32,
    /// Character-class modifier applied on top of the base speed.
    pub speed_modifier: f32,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            base_movement_speed: 5.0,
            rotation_speed: 10.0,
            carrying_speed_multiplier: 0.7,
            speed_modifier: 1.0,
        }
    }
}

impl MovementSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("base movement speed", self.base_movement_speed),
            ("rotation speed", self.rotation_speed),
            ("speed modifier", self.speed_modifier),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        let carry = self.carrying_speed_multiplier;
        if !(carry > 0.0 && carry < 1.0) {
            return Err(ConfigError::InvalidCarryingMultiplier(carry));
        }

        Ok(())
    }

    /// Base speed scaled by the character-class modifier.
    pub fn movement_speed(&self) -> f32 {
        self.base_movement_speed * self.speed_modifier
    }
}

/// Prediction and reconciliation settings for the owning client.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionConfig {
    pub enable_prediction: bool,
    pub max_input_history_size: usize,
    pub reconciliation_threshold: f32,
    pub enable_input_smoothing: bool,
    pub input_smooth_time: f32,
    /// Simulation rate shared by client and server.
    pub tick_rate: u32,
    pub stun_recovery: StunRecovery,
    pub movement: MovementSettings,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enable_prediction: true,
            max_input_history_size: DEFAULT_MAX_INPUT_HISTORY,
            reconciliation_threshold: DEFAULT_RECONCILIATION_THRESHOLD,
            enable_input_smoothing: true,
            input_smooth_time: DEFAULT_INPUT_SMOOTH_TIME,
            tick_rate: DEFAULT_TICK_RATE,
            stun_recovery: StunRecovery::default(),
            movement: MovementSettings::default(),
        }
    }
}

impl PredictionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_input_history_size == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }

        let threshold = self.reconciliation_threshold;
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        let smooth = self.input_smooth_time;
        if !(smooth.is_finite() && smooth > 0.0) {
            return Err(ConfigError::InvalidSmoothTime(smooth));
        }

        self.movement.validate()
    }

    /// Length of one simulation step in seconds.
    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}
