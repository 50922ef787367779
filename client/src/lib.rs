//! # Client Prediction Library
//!
//! Everything the owning client runs to keep its own entity responsive while
//! the server stays authoritative.
//!
//! ## Client-Side Prediction
//! Each fixed step the client smooths the raw directional input, stamps it
//! with the next sequence number, applies the shared movement model to its
//! local entity immediately and sends the input to the server. The pair
//! (input, predicted state) is kept in a bounded history.
//!
//! ## Server Reconciliation
//! The server answers with authoritative states tagged with the sequence
//! number of the input that produced them. The client looks up what it
//! predicted for that sequence:
//! - within the threshold, nothing happens;
//! - beyond it, the entity snaps to the server state and every newer buffered
//!   input is replayed on top, using the movement mode active right now;
//! - if nothing was recorded for that sequence, the server state is taken as is.
//!
//! Acknowledgements older than the last one seen are dropped, so loss,
//! duplication and reordering on the wire never move the entity backwards.
//!
//! ## Module Organization
//! - [`input`]: raw input clamping, critically damped smoothing, scripted patterns
//! - [`history`]: bounded, sequence-ordered (input, state) buffer
//! - [`predictor`]: sequence stamping, local application, the outbound [`predictor::InputSink`]
//! - [`reconciler`]: watermark, error threshold, snap and replay
//! - [`game`]: [`game::PredictedEntity`], the per-entity glue the host loop drives
//! - [`network`]: UDP host with simulated latency and packet loss
//!
//! ## Usage Example
//!
//! ```rust
//! use client::game::PredictedEntity;
//! use glam::Vec2;
//! use shared::{EntityState, InputSample, PredictionConfig};
//!
//! let config = PredictionConfig::default();
//! let dt = config.fixed_dt();
//! let mut entity = PredictedEntity::new(config, EntityState::default());
//! let mut outbox: Vec<InputSample> = Vec::new();
//!
//! entity.set_raw_input(Vec2::new(1.0, 0.0));
//! entity.tick(dt, &mut outbox);
//!
//! // Later, when the server's answer for sequence 0 arrives:
//! let server_state = *entity.history().iter().next().map(|e| &e.state).unwrap();
//! let outcome = entity.on_authoritative_state(&server_state);
//! assert!(!outcome.moved_entity());
//! ```

pub mod game;
pub mod history;
pub mod input;
pub mod network;
pub mod predictor;
pub mod reconciler;
