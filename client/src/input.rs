//! Client input capture and smoothing

use clap::ValueEnum;
use glam::Vec2;
use shared::clamp_movement;

/// Turns raw per-tick directional input into a smoothed movement vector.
///
/// The smoothed vector chases the raw one with a critically damped spring,
/// which removes jitter from digital input without overshooting.
#[derive(Debug, Clone)]
pub struct InputSmoother {
    enabled: bool,
    smooth_time: f32,
    raw: Vec2,
    smoothed: Vec2,
    velocity: Vec2,
}

impl InputSmoother {
    /// `smooth_time` is the approximate time to reach a new raw input.
    pub fn new(enabled: bool, smooth_time: f32) -> Self {
        Self {
            enabled,
            smooth_time: smooth_time.max(1e-4),
            raw: Vec2::ZERO,
            smoothed: Vec2::ZERO,
            velocity: Vec2::ZERO,
        }
    }

    /// Stores the latest raw input, clamped into the unit disc.
    pub fn set_raw_input(&mut self, raw: Vec2) {
        self.raw = clamp_movement(raw);
    }

    pub fn raw_input(&self) -> Vec2 {
        self.raw
    }

    pub fn smoothed_input(&self) -> Vec2 {
        self.smoothed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_smoothing_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.smoothed = self.raw;
        self.velocity = Vec2::ZERO;
    }

    /// Moves the smoothed value towards the raw input by one step.
    pub fn tick(&mut self, dt: f32) {
        if !self.enabled || dt <= 0.0 {
            self.smoothed = self.raw;
            self.velocity = Vec2::ZERO;
            return;
        }

        self.smoothed = clamp_movement(self.smooth_damp(dt));
    }

    pub fn reset(&mut self) {
        self.raw = Vec2::ZERO;
        self.smoothed = Vec2::ZERO;
        self.velocity = Vec2::ZERO;
    }

    fn smooth_damp(&mut self, dt: f32) -> Vec2 {
        let omega = 2.0 / self.smooth_time;
        let x = omega * dt;
        let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

        let target = self.raw;
        let change = self.smoothed - target;
        let temp = (self.velocity + omega * change) * dt;
        self.velocity = (self.velocity - omega * temp) * decay;

        let mut output = target + (change + temp) * decay;

        // Never overshoot the target.
        if (target - self.smoothed).dot(output - target) > 0.0 {
            output = target;
            self.velocity = Vec2::ZERO;
        }
        output
    }
}

impl Default for InputSmoother {
    fn default() -> Self {
        Self::new(true, shared::config::DEFAULT_INPUT_SMOOTH_TIME)
    }
}

/// Scripted raw input for the headless client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputPattern {
    /// No input at all
    Idle,
    /// Left and right, switching every two seconds
    Strafe,
    /// The four axis directions, 1.5 seconds each
    Square,
    /// Continuous circle, one lap every ~6 seconds
    Circle,
}

impl InputPattern {
    /// Raw input at `time` seconds since the pattern started.
    pub fn sample(self, time: f64) -> Vec2 {
        match self {
            InputPattern::Idle => Vec2::ZERO,
            InputPattern::Strafe => {
                if (time / 2.0).floor() as i64 % 2 == 0 {
                    Vec2::X
                } else {
                    Vec2::NEG_X
                }
            }
            InputPattern::Square => match (time / 1.5).floor() as i64 % 4 {
                0 => Vec2::X,
                1 => Vec2::Y,
                2 => Vec2::NEG_X,
                _ => Vec2::NEG_Y,
            },
            InputPattern::Circle => {
                let angle = time as f32;
                Vec2::new(angle.cos(), angle.sin())
            }
        }
    }
}
