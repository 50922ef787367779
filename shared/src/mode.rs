//! Movement-mode state machine.
//!
//! Decides which speed multiplier the movement model uses and whether input
//! is accepted. Idle and Moving follow the input magnitude, Carrying follows
//! the carrying flag, and Stunned is forced by gameplay for a fixed duration.

use glam::Vec2;
use log::debug;
use serde::{Deserialize, Serialize};

/// Input magnitude above which the entity counts as moving.
pub const MOVE_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MovementMode {
    #[default]
    Idle,
    Moving,
    Carrying,
    Stunned,
}

/// What a stun returns to once it expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StunRecovery {
    /// Return to the mode the entity had when it was stunned.
    #[default]
    RestorePrevious,
    /// Always return to Idle, whatever the entity was doing before.
    Idle,
}

/// A mode change reported by [`ModeMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub previous: MovementMode,
    pub current: MovementMode,
}

/// Tracks the current [`MovementMode`] and the stun countdown.
#[derive(Debug, Clone)]
pub struct ModeMachine {
    current: MovementMode,
    stun_remaining: f32,
    pre_stun: MovementMode,
    recovery: StunRecovery,
}

impl ModeMachine {
    pub fn new(recovery: StunRecovery) -> Self {
        Self {
            current: MovementMode::Idle,
            stun_remaining: 0.0,
            pre_stun: MovementMode::Idle,
            recovery,
        }
    }

    pub fn current(&self) -> MovementMode {
        self.current
    }

    pub fn is_stunned(&self) -> bool {
        self.current == MovementMode::Stunned
    }

    /// Stunned entities ignore movement input.
    pub fn accepts_input(&self) -> bool {
        !self.is_stunned()
    }

    /// Seconds left on the running stun, zero when not stunned.
    pub fn stun_remaining(&self) -> f32 {
        self.stun_remaining
    }

    /// Advances the stun countdown, then derives the mode from input and the
    /// carrying flag. Returns the transition if the mode changed.
    ///
    /// The step on which a stun expires resolves to the recovery mode; input
    /// and the carrying flag take over again from the next step.
    pub fn step(&mut self, movement: Vec2, carrying: bool, dt: f32) -> Option<ModeTransition> {
        let previous = self.current;

        if self.is_stunned() {
            self.stun_remaining -= dt;
            if self.stun_remaining <= 0.0 {
                self.end_stun();
                return self.transition_from(previous);
            }
            return None;
        }

        self.current = if carrying {
            MovementMode::Carrying
        } else if movement.length() > MOVE_EPSILON {
            MovementMode::Moving
        } else {
            MovementMode::Idle
        };

        self.transition_from(previous)
    }

    /// Forces Stunned for `duration` seconds. A running stun keeps whichever
    /// remaining time is longer.
    pub fn stun(&mut self, duration: f32) -> Option<ModeTransition> {
        if !(duration.is_finite() && duration > 0.0) {
            return None;
        }

        let previous = self.current;
        if self.is_stunned() {
            self.stun_remaining = self.stun_remaining.max(duration);
            return None;
        }

        debug!("Stunned for {:.2}s (was {:?})", duration, previous);
        self.pre_stun = previous;
        self.stun_remaining = duration;
        self.current = MovementMode::Stunned;
        self.transition_from(previous)
    }

    /// Ends a running stun immediately, applying the recovery policy.
    pub fn clear_stun(&mut self) -> Option<ModeTransition> {
        let previous = self.current;
        if self.is_stunned() {
            self.end_stun();
        }
        self.transition_from(previous)
    }

    fn end_stun(&mut self) {
        self.stun_remaining = 0.0;
        self.current = match self.recovery {
            StunRecovery::RestorePrevious => self.pre_stun,
            StunRecovery::Idle => MovementMode::Idle,
        };
    }

    fn transition_from(&self, previous: MovementMode) -> Option<ModeTransition> {
        (previous != self.current).then_some(ModeTransition {
            previous,
            current: self.current,
        })
    }
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new(StunRecovery::default())
    }
}
