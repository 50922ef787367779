//! Local prediction for the owning client.

use crate::history::{HistoryBuffer, HistoryEntry};
use glam::Vec2;
use shared::{advance, EntityState, InputSample, MovementMode, MovementSettings};
use tokio::sync::mpsc;

/// Outbound side of the network boundary for stamped inputs.
///
/// Sends are fire-and-forget: nothing in the core waits for, or relies on,
/// delivery.
pub trait InputSink {
    fn send_input(&mut self, input: &InputSample);
}

impl InputSink for Vec<InputSample> {
    fn send_input(&mut self, input: &InputSample) {
        self.push(*input);
    }
}

impl InputSink for mpsc::UnboundedSender<InputSample> {
    fn send_input(&mut self, input: &InputSample) {
        // A closed channel means the connection is going away.
        let _ = self.send(*input);
    }
}

/// Stamps inputs with sequence numbers and applies them immediately.
#[derive(Debug, Clone)]
pub struct LocalPredictor {
    next_sequence: u32,
    clock: f64,
}

impl LocalPredictor {
    pub fn new() -> Self {
        Self {
            next_sequence: 0,
            clock: 0.0,
        }
    }

    /// Sequence number the next stamped input will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Simulation time of the most recent stamp.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Issues the next input sample. Sequence numbers start at 0 and grow by
    /// exactly one per call.
    pub fn stamp(&mut self, movement: Vec2, dt: f32) -> InputSample {
        self.clock += dt as f64;
        let input = InputSample::new(self.next_sequence, movement, self.clock);
        self.next_sequence += 1;
        input
    }

    /// Applies `input` to the live entity and records the resulting pair.
    pub fn predict(
        &self,
        settings: &MovementSettings,
        entity: &mut EntityState,
        input: &InputSample,
        mode: MovementMode,
        dt: f32,
        history: &mut HistoryBuffer,
    ) -> EntityState {
        *entity = advance(settings, entity, input, mode, dt);
        history.push(HistoryEntry::new(*input, *entity));
        *entity
    }
}

impl Default for LocalPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_sequence_starts_at_zero_and_increments() {
        let mut predictor = LocalPredictor::new();
        let sequences: Vec<u32> = (0..100)
            .map(|_| predictor.stamp(Vec2::X, DT).sequence_number)
            .collect();

        assert_eq!(sequences[0], 0);
        for pair in sequences.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
        assert_eq!(predictor.next_sequence(), 100);
    }

    #[test]
    fn test_stamp_advances_clock() {
        let mut predictor = LocalPredictor::new();
        let a = predictor.stamp(Vec2::ZERO, 0.5);
        let b = predictor.stamp(Vec2::ZERO, 0.5);
        assert!(b.timestamp > a.timestamp);
        assert!((predictor.clock() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_predict_moves_entity_and_records() {
        let mut predictor = LocalPredictor::new();
        let mut history = HistoryBuffer::new(60);
        let mut entity = EntityState::default();
        let settings = MovementSettings {
            base_movement_speed: 1.0,
            ..Default::default()
        };

        let input = predictor.stamp(Vec2::X, 0.1);
        let state = predictor.predict(
            &settings,
            &mut entity,
            &input,
            MovementMode::Moving,
            0.1,
            &mut history,
        );

        assert_eq!(entity, state);
        assert!(entity.position.x > 0.0);
        assert_eq!(history.len(), 1);
        assert_eq!(history.find_state_by_sequence(0), Some(state));
        assert_eq!(state.position, Vec3::new(0.1, 0.0, 0.0));
    }

    #[test]
    fn test_vec_sink_collects_inputs() {
        let mut sink: Vec<InputSample> = Vec::new();
        let mut predictor = LocalPredictor::new();
        for _ in 0..3 {
            let input = predictor.stamp(Vec2::Y, DT);
            sink.send_input(&input);
        }
        assert_eq!(sink.len(), 3);
        assert_eq!(sink[2].sequence_number, 2);
    }

    #[test]
    fn test_channel_sink_forwards_inputs() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<InputSample>();
        let input = InputSample::new(5, Vec2::X, 0.0);
        tx.send_input(&input);
        assert_eq!(rx.try_recv().unwrap().sequence_number, 5);
    }
}
