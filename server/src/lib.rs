//! # Arena Server Library
//!
//! Authoritative server for a multiplayer arena where every player steers a
//! segmented creature, eats food to grow and dies on contact with another
//! creature's body. Clients only send intents; the server owns the world,
//! runs it at a fixed tick rate and broadcasts what changed.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The [`game::World`] and its tick pipeline:
//! - Movement, boundary deaths and the boost length cost
//! - Food consumption and creature contact resolution
//! - Death scatter and food replenishment
//! - Dirty tracking that decides what goes into each state delta
//!
//! ### Entity Module (`entity`)
//! Creatures, food particles and the slot-indexed food field, plus safe
//! spawn point selection.
//!
//! ### Spatial Module (`spatial`)
//! A uniform grid over the world that turns proximity tests into a fixed
//! neighbourhood lookup. It is rebuilt from scratch every tick.
//!
//! ### Collision Module (`collision`)
//! Grid population, eating, lethal contact tests and death scatter.
//!
//! ### Client Manager Module (`client_manager`)
//! Session bookkeeping for connected addresses: id assignment, capacity,
//! timeouts and per-client input pacing. Incoming packets are validated
//! here into [`game::GameCommand`]s.
//!
//! ### Network Module (`network`)
//! UDP transport and the tick driver. Validated commands are queued and
//! applied at the start of the next tick, so the world is never touched
//! while a tick is running.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::World;
//! use server::network::Server;
//! use shared::GameConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = World::new(GameConfig::default());
//!     let mut server = Server::new("127.0.0.1:8080", world, 64).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod collision;
pub mod entity;
pub mod game;
pub mod network;
pub mod spatial;
pub mod utils;
