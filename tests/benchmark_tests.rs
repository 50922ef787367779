//! Performance benchmarks for the prediction hot paths

use client::game::PredictedEntity;
use client::history::{HistoryBuffer, HistoryEntry};
use client::reconciler::ReconcileOutcome;
use glam::{Vec2, Vec3};
use shared::{advance, EntityState, InputSample, MovementMode, MovementSettings, PredictionConfig};
use std::time::Instant;

/// Benchmarks a single movement step
#[test]
fn benchmark_movement_step() {
    let settings = MovementSettings::default();
    let mut state = EntityState::default();
    let dt = 1.0 / 60.0;

    let iterations = 100_000u32;
    let start = Instant::now();

    for i in 0..iterations {
        let angle = i as f32 * 0.01;
        let input = InputSample::new(i, Vec2::new(angle.cos(), angle.sin()), 0.0);
        state = advance(&settings, &state, &input, MovementMode::Moving, dt);
    }

    let duration = start.elapsed();
    println!(
        "Movement step: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(state.position.is_finite());
    // Should complete in under 2 seconds even unoptimized
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks worst-case reconciliation: a correction replaying a full history
#[test]
fn benchmark_full_history_replay() {
    let config = PredictionConfig {
        enable_input_smoothing: false,
        ..Default::default()
    };
    let dt = config.fixed_dt();
    let capacity = config.max_input_history_size;

    let iterations = 1_000;
    let mut replayed = 0;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut entity = PredictedEntity::new(config.clone(), EntityState::default());
        let mut outbox: Vec<InputSample> = Vec::with_capacity(capacity);
        entity.set_raw_input(Vec2::X);
        for _ in 0..capacity {
            entity.tick(dt, &mut outbox);
        }

        let mut server = entity.history().find_state_by_sequence(0).unwrap();
        server.position += Vec3::new(1.0, 0.0, 0.0);

        if let ReconcileOutcome::Corrected { replayed: count, .. } =
            entity.on_authoritative_state(&server)
        {
            replayed += count;
        }
    }

    let duration = start.elapsed();
    println!(
        "Full replay: {} corrections ({} inputs replayed) in {:?} ({:.2} μs/correction)",
        iterations,
        replayed,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(replayed, iterations * (capacity - 1));
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks history insertion with eviction at capacity
#[test]
fn benchmark_history_push() {
    let mut history = HistoryBuffer::new(60);
    let mut state = EntityState::default();

    let iterations = 100_000u32;
    let start = Instant::now();

    for i in 0..iterations {
        state.sequence_number = i;
        history.push(HistoryEntry::new(InputSample::new(i, Vec2::X, 0.0), state));
    }

    let duration = start.elapsed();
    println!(
        "History push: {} entries in {:?} ({:.2} ns/push)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(history.len(), 60);
    assert_eq!(history.oldest_sequence(), Some(iterations - 60));
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks packet encode and decode
#[test]
fn benchmark_packet_serialization() {
    use shared::{InputMessage, Packet, StateAckMessage};

    let state = EntityState::new(Vec3::new(1.0, 2.0, 3.0));
    let packets = [
        Packet::StateAck(StateAckMessage::from(&state)),
        Packet::Input(InputMessage::from(&InputSample::new(7, Vec2::Y, 1.5))),
    ];

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        for packet in &packets {
            let data = packet.encode().unwrap();
            let _decoded = Packet::decode(&data).unwrap();
        }
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Stress tests the server input queue with reversed delivery
#[test]
fn stress_test_reordered_inputs() {
    use server::client_manager::ClientManager;

    let mut manager = ClientManager::new(1);
    let client_id = manager.add_client("127.0.0.1:8080".parse().unwrap()).unwrap();

    let start = Instant::now();

    for sequence in (0..100u32).rev() {
        manager.add_input(client_id, InputSample::new(sequence, Vec2::X, 0.0));
    }
    let drained = manager.drain_inputs();

    let duration = start.elapsed();
    println!("Input queue: 100 reordered inputs in {:?}", duration);

    let sequences: Vec<u32> = drained[0].1.iter().map(|i| i.sequence_number).collect();
    assert_eq!(sequences, (0..100).collect::<Vec<u32>>());
    assert!(duration.as_millis() < 100);
}
