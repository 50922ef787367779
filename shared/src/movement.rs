//! Deterministic movement model.
//!
//! [`advance`] is the only function that moves an entity. The client runs it
//! to predict and to replay, the server runs it to produce authoritative
//! states, so it must stay a pure function of its arguments.

use crate::config::MovementSettings;
use crate::mode::MovementMode;
use crate::{clamp_movement, EntityState, InputSample};
use glam::{Quat, Vec3};

/// Squared input magnitude below which the entity stops.
pub const INPUT_DEAD_ZONE_SQ: f32 = 0.01;

pub fn mode_multiplier(settings: &MovementSettings, mode: MovementMode) -> f32 {
    match mode {
        MovementMode::Idle | MovementMode::Moving => 1.0,
        MovementMode::Carrying => settings.carrying_speed_multiplier,
        MovementMode::Stunned => 0.0,
    }
}

/// Applies one input for `dt` seconds and returns the resulting state.
///
/// Input `(x, y)` drives the horizontal plane `(x, 0, y)`; vertical velocity
/// is carried through untouched. Position uses explicit Euler integration.
pub fn advance(
    settings: &MovementSettings,
    state: &EntityState,
    input: &InputSample,
    mode: MovementMode,
    dt: f32,
) -> EntityState {
    let mut next = EntityState {
        timestamp: state.timestamp + dt as f64,
        sequence_number: input.sequence_number,
        ..*state
    };

    if mode == MovementMode::Stunned {
        next.velocity = Vec3::ZERO;
        return next;
    }

    let movement = clamp_movement(input.movement);
    if movement.length_squared() < INPUT_DEAD_ZONE_SQ {
        next.velocity = Vec3::new(0.0, state.velocity.y, 0.0);
        next.position += next.velocity * dt;
        return next;
    }

    let speed = settings.movement_speed() * mode_multiplier(settings, mode);
    next.velocity = Vec3::new(movement.x * speed, state.velocity.y, movement.y * speed);
    next.orientation = turn_towards(
        state.orientation,
        movement.x,
        movement.y,
        settings.rotation_speed * dt,
    );
    next.position += next.velocity * dt;
    next
}

/// Yaw that faces the horizontal direction `(dx, 0, dz)`, +Z being forward.
pub fn facing(dx: f32, dz: f32) -> Quat {
    Quat::from_rotation_y(dx.atan2(dz))
}

fn turn_towards(current: Quat, dx: f32, dz: f32, max_angle: f32) -> Quat {
    let target = facing(dx, dz);
    let angle = current.angle_between(target);
    if angle <= max_angle || angle < 1e-6 {
        target
    } else {
        current.slerp(target, max_angle / angle).normalize()
    }
}
