use crate::simulator::AuthoritativeSimulator;
use glam::Vec3;
use log::info;
use shared::{EntityState, InputSample, MovementSettings, StunRecovery};
use std::collections::HashMap;

/// Distance between neighbouring spawn points.
const SPAWN_SPACING: f32 = 2.0;
/// Spawn points per row before wrapping to the next one.
const SPAWN_COLUMNS: u32 = 8;

/// The authoritative world: one simulator per connected player.
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u32,
    pub players: HashMap<u32, AuthoritativeSimulator>,
    settings: MovementSettings,
    fixed_dt: f32,
    recovery: StunRecovery,
}

impl GameState {
    pub fn new(settings: MovementSettings, fixed_dt: f32, recovery: StunRecovery) -> Self {
        Self {
            tick: 0,
            players: HashMap::new(),
            settings,
            fixed_dt,
            recovery,
        }
    }

    pub fn settings(&self) -> &MovementSettings {
        &self.settings
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Grid position for `client_id`, eight to a row.
    pub fn spawn_point(client_id: u32) -> Vec3 {
        let column = client_id % SPAWN_COLUMNS;
        let row = client_id / SPAWN_COLUMNS;
        Vec3::new(
            column as f32 * SPAWN_SPACING,
            0.0,
            row as f32 * SPAWN_SPACING,
        )
    }

    /// Spawns a fresh entity for `client_id`, replacing any previous one.
    pub fn add_player(&mut self, client_id: u32) -> EntityState {
        let spawn = EntityState::new(Self::spawn_point(client_id));

        info!(
            "Added player {} at ({}, {}, {})",
            client_id, spawn.position.x, spawn.position.y, spawn.position.z
        );
        self.players
            .insert(client_id, AuthoritativeSimulator::new(spawn, self.recovery));
        spawn
    }

    pub fn remove_player(&mut self, client_id: &u32) {
        if self.players.remove(client_id).is_some() {
            info!("Removed player {}", client_id);
        }
    }

    /// Applies one input for `client_id` and returns the authoritative result.
    pub fn apply_input(&mut self, client_id: u32, input: &InputSample) -> Option<EntityState> {
        let settings = self.settings;
        let dt = self.fixed_dt;
        self.players
            .get_mut(&client_id)
            .and_then(|player| player.apply_input(&settings, input, dt))
    }

    /// Stuns one player. False if the player is unknown.
    pub fn stun(&mut self, client_id: u32, duration: f32) -> bool {
        match self.players.get_mut(&client_id) {
            Some(player) => {
                player.stun(duration);
                true
            }
            None => false,
        }
    }

    /// Ends a player's stun early. False if the player is unknown.
    pub fn clear_stun(&mut self, client_id: u32) -> bool {
        match self.players.get_mut(&client_id) {
            Some(player) => {
                player.clear_stun();
                true
            }
            None => false,
        }
    }

    /// Flips the carrying flag and returns the new value.
    pub fn toggle_carrying(&mut self, client_id: u32) -> Option<bool> {
        self.players.get_mut(&client_id).map(|player| {
            let carrying = !player.is_carrying();
            player.set_carrying(carrying);
            carrying
        })
    }

    /// Sets the speed modifier for one player. False if the player is unknown
    /// or the modifier is not a positive finite number.
    pub fn set_speed_modifier(&mut self, client_id: u32, modifier: f32) -> bool {
        self.players
            .get_mut(&client_id)
            .is_some_and(|player| player.set_speed_modifier(modifier))
    }

    pub fn player_state(&self, client_id: u32) -> Option<&EntityState> {
        self.players.get(&client_id).map(AuthoritativeSimulator::state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use glam::Vec2;
    use shared::MovementMode;

    fn game() -> GameState {
        GameState::new(MovementSettings::default(), 1.0 / 60.0, StunRecovery::default())
    }

    #[test]
    fn test_add_and_remove_player() {
        let mut game = game();
        let spawn = game.add_player(3);
        assert_eq!(spawn.position, GameState::spawn_point(3));
        assert!(game.player_state(3).is_some());

        game.remove_player(&3);
        assert!(game.player_state(3).is_none());
    }

    #[test]
    fn test_spawn_points_are_distinct() {
        let a = GameState::spawn_point(1);
        let b = GameState::spawn_point(2);
        let c = GameState::spawn_point(1 + SPAWN_COLUMNS);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_apply_input_for_unknown_player() {
        let mut game = game();
        assert!(game
            .apply_input(9, &InputSample::new(0, Vec2::X, 0.0))
            .is_none());
    }

    #[test]
    fn test_apply_input_moves_player() {
        let mut game = game();
        let spawn = game.add_player(1);
        let state = game
            .apply_input(1, &InputSample::new(0, Vec2::X, 0.0))
            .unwrap();
        let step = MovementSettings::default().movement_speed() / 60.0;
        assert_approx_eq!(state.position.x, spawn.position.x + step, 1e-6);
        assert_eq!(state.sequence_number, 0);
    }

    #[test]
    fn test_toggle_carrying_and_stun() {
        let mut game = game();
        game.add_player(1);

        assert_eq!(game.toggle_carrying(1), Some(true));
        game.apply_input(1, &InputSample::new(0, Vec2::X, 0.0));
        assert_eq!(game.players[&1].mode(), MovementMode::Carrying);

        assert!(game.stun(1, 1.0));
        assert_eq!(game.players[&1].mode(), MovementMode::Stunned);
        assert!(game.clear_stun(1));
        assert_eq!(game.players[&1].mode(), MovementMode::Carrying);

        assert_eq!(game.toggle_carrying(1), Some(false));
        assert_eq!(game.toggle_carrying(7), None);
        assert!(!game.stun(7, 1.0));
    }

    #[test]
    fn test_speed_modifier_applies_to_one_player() {
        let mut game = game();
        let spawn_one = game.add_player(1);
        let spawn_two = game.add_player(2);

        assert!(game.set_speed_modifier(1, 2.0));
        assert!(!game.set_speed_modifier(1, -1.0));
        assert!(!game.set_speed_modifier(9, 2.0));

        let one = game
            .apply_input(1, &InputSample::new(0, Vec2::X, 0.0))
            .unwrap();
        let two = game
            .apply_input(2, &InputSample::new(0, Vec2::X, 0.0))
            .unwrap();
        let step = MovementSettings::default().movement_speed() / 60.0;
        assert_approx_eq!(one.position.x - spawn_one.position.x, 2.0 * step, 1e-5);
        assert_approx_eq!(two.position.x - spawn_two.position.x, step, 1e-5);
    }
}
