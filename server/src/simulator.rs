//! Authoritative simulation of one player-controlled entity.

use log::trace;
use shared::{
    advance, EntityState, InputSample, ModeMachine, MovementMode, MovementSettings, StunRecovery,
};

/// Server-side copy of an entity, advanced only by the inputs its owner sends.
///
/// Runs exactly the movement model the client predicts with, one fixed step
/// per input, and tags every produced state with that input's sequence number.
#[derive(Debug, Clone)]
pub struct AuthoritativeSimulator {
    state: EntityState,
    mode: ModeMachine,
    carrying: bool,
    speed_modifier: Option<f32>,
    last_processed: Option<u32>,
}

impl AuthoritativeSimulator {
    /// Starts at `spawn` with no input processed yet.
    pub fn new(spawn: EntityState, recovery: StunRecovery) -> Self {
        Self {
            state: spawn,
            mode: ModeMachine::new(recovery),
            carrying: false,
            speed_modifier: None,
            last_processed: None,
        }
    }

    /// Applies one input. Inputs at or below the last processed sequence are
    /// duplicates or arrived too late and are dropped.
    pub fn apply_input(
        &mut self,
        settings: &MovementSettings,
        input: &InputSample,
        dt: f32,
    ) -> Option<EntityState> {
        if self
            .last_processed
            .is_some_and(|last| input.sequence_number <= last)
        {
            trace!("Skipping old input {}", input.sequence_number);
            return None;
        }

        let mut settings = *settings;
        if let Some(modifier) = self.speed_modifier {
            settings.speed_modifier = modifier;
        }

        self.mode.step(input.movement, self.carrying, dt);
        self.state = advance(&settings, &self.state, input, self.mode.current(), dt);
        self.last_processed = Some(input.sequence_number);
        Some(self.state)
    }

    pub fn stun(&mut self, duration: f32) {
        self.mode.stun(duration);
    }

    pub fn clear_stun(&mut self) {
        self.mode.clear_stun();
    }

    pub fn set_carrying(&mut self, carrying: bool) {
        self.carrying = carrying;
    }

    /// Overrides the world speed modifier for this entity. Non-finite or
    /// non-positive values are rejected.
    pub fn set_speed_modifier(&mut self, modifier: f32) -> bool {
        if !(modifier.is_finite() && modifier > 0.0) {
            return false;
        }
        self.speed_modifier = Some(modifier);
        true
    }

    pub fn speed_modifier(&self) -> Option<f32> {
        self.speed_modifier
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn mode(&self) -> MovementMode {
        self.mode.current()
    }

    /// Sequence of the newest applied input.
    pub fn last_processed(&self) -> Option<u32> {
        self.last_processed
    }
}
