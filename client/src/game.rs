use crate::history::HistoryBuffer;
use crate::input::InputSmoother;
use crate::predictor::{InputSink, LocalPredictor};
use crate::reconciler::{ReconcileOutcome, Reconciler, ReconcilerStats};
use glam::Vec2;
use log::debug;
use shared::{
    advance, EntityState, ModeMachine, ModeTransition, MovementMode, MovementSettings,
    PredictionConfig,
};

/// Everything the owning client runs for its own entity.
///
/// The host loop calls [`PredictedEntity::tick`] once per fixed step and feeds
/// every authoritative state from the server into
/// [`PredictedEntity::on_authoritative_state`] between ticks.
pub struct PredictedEntity {
    config: PredictionConfig,
    entity: EntityState,
    smoother: InputSmoother,
    mode: ModeMachine,
    carrying: bool,
    predictor: LocalPredictor,
    history: HistoryBuffer,
    reconciler: Reconciler,
}

impl PredictedEntity {
    /// Starts predicting from `spawn` with an empty history.
    pub fn new(config: PredictionConfig, spawn: EntityState) -> Self {
        Self {
            entity: spawn,
            smoother: InputSmoother::new(config.enable_input_smoothing, config.input_smooth_time),
            mode: ModeMachine::new(config.stun_recovery),
            carrying: false,
            predictor: LocalPredictor::new(),
            history: HistoryBuffer::new(config.max_input_history_size),
            reconciler: Reconciler::new(config.reconciliation_threshold),
            config,
        }
    }

    /// Runs one simulation step: smoothing, mode update, then prediction.
    ///
    /// The stamped input goes to `sink` whether or not prediction is enabled;
    /// with prediction off the entity only moves when the server says so.
    pub fn tick(&mut self, dt: f32, sink: &mut impl InputSink) -> Option<ModeTransition> {
        self.smoother.tick(dt);
        let movement = self.smoother.smoothed_input();

        let transition = self.mode.step(movement, self.carrying, dt);
        if let Some(change) = transition {
            debug!("Movement mode {:?} -> {:?}", change.previous, change.current);
        }

        let input = self.predictor.stamp(movement, dt);
        if self.config.enable_prediction {
            self.predictor.predict(
                &self.config.movement,
                &mut self.entity,
                &input,
                self.mode.current(),
                dt,
                &mut self.history,
            );
        }
        sink.send_input(&input);

        transition
    }

    /// Reconciles one authoritative state, replaying with the current mode
    /// and the fixed step. With prediction off every fresh ack snaps.
    pub fn on_authoritative_state(&mut self, server: &EntityState) -> ReconcileOutcome {
        if !self.config.enable_prediction {
            if self.reconciler.is_stale(server.sequence_number) {
                return ReconcileOutcome::Stale;
            }
            // Nothing predicted: with an empty history every fresh ack snaps.
            self.history.clear();
        }

        let settings = self.config.movement;
        let mode = self.mode.current();
        let dt = self.config.fixed_dt();

        self.reconciler.reconcile(
            server,
            &mut self.entity,
            &mut self.history,
            |state, input| advance(&settings, state, input, mode, dt),
        )
    }

    pub fn set_raw_input(&mut self, raw: Vec2) {
        self.smoother.set_raw_input(raw);
    }

    pub fn set_smoothing_enabled(&mut self, enabled: bool) {
        self.smoother.set_smoothing_enabled(enabled);
    }

    /// Toggling prediction either way drops the recorded history.
    pub fn set_prediction_enabled(&mut self, enabled: bool) {
        if self.config.enable_prediction != enabled {
            self.history.clear();
        }
        self.config.enable_prediction = enabled;
    }

    pub fn set_carrying(&mut self, carrying: bool) {
        self.carrying = carrying;
    }

    /// Replaces the character-class speed modifier. The server sends the
    /// same value as a gameplay event; non-finite or non-positive values
    /// are ignored.
    pub fn set_movement_speed_modifier(&mut self, modifier: f32) {
        if modifier.is_finite() && modifier > 0.0 {
            self.config.movement.speed_modifier = modifier;
        }
    }

    pub fn set_movement_settings(&mut self, settings: MovementSettings) {
        self.config.movement = settings;
    }

    /// Stuns the entity for `duration` seconds of simulated time.
    pub fn stun(&mut self, duration: f32) -> Option<ModeTransition> {
        self.mode.stun(duration)
    }

    pub fn clear_stun(&mut self) -> Option<ModeTransition> {
        self.mode.clear_stun()
    }

    /// Drops all prediction state and starts over from `spawn`.
    pub fn reset(&mut self, spawn: EntityState) {
        self.entity = spawn;
        self.smoother.reset();
        self.mode = ModeMachine::new(self.config.stun_recovery);
        self.carrying = false;
        self.predictor = LocalPredictor::new();
        self.history.clear();
        self.reconciler.reset();
    }

    pub fn state(&self) -> &EntityState {
        &self.entity
    }

    pub fn mode(&self) -> MovementMode {
        self.mode.current()
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying
    }

    pub fn smoothed_input(&self) -> Vec2 {
        self.smoother.smoothed_input()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn next_sequence(&self) -> u32 {
        self.predictor.next_sequence()
    }

    pub fn last_acknowledged(&self) -> Option<u32> {
        self.reconciler.last_acknowledged()
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.reconciler.stats()
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// One line per field, for the status log.
    pub fn debug_info(&self) -> String {
        let stats = self.stats();
        let last_ack = self
            .last_acknowledged()
            .map_or_else(|| "-".to_string(), |ack| ack.to_string());
        format!(
            "Sequence: {}\nHistory: {}/{}\nLast Ack: {}\nMode: {:?}\nCorrections: {} (hard snaps {}, stale {})",
            self.next_sequence(),
            self.history.len(),
            self.history.capacity(),
            last_ack,
            self.mode(),
            stats.corrected,
            stats.hard_snaps,
            stats.stale,
        )
    }
}
