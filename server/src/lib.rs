//! # Authoritative Movement Server
//!
//! Owns the canonical state of every player entity. Clients send stamped
//! inputs; the server applies each one exactly once, in sequence order, with
//! the same fixed step and movement model the clients predict with, and
//! answers with the resulting state tagged by that input's sequence number.
//!
//! ## Module Organization
//! - [`simulator`]: one entity advanced by its owner's inputs
//! - [`game`]: the world of simulators, spawning and gameplay events
//! - [`client_manager`]: connections, timeouts and ordered input queues
//! - [`network`]: UDP host, fixed tick loop and acknowledgement sending
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerOptions::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
pub mod simulator;
