//! # Player State Relay Server
//!
//! This library implements a real-time state relay for a multiplayer 3D
//! world. Clients connect over WebSockets, announce themselves with `join`,
//! and push their position, orientation and vitals with `update`. The server
//! fans each client's state out to every other connected client and evicts
//! clients that stop reporting.
//!
//! The server is not authoritative: it runs no simulation and validates no
//! state. It keeps the latest reported state of each player so that new
//! arrivals can be told who is already there.
//!
//! ## Architecture
//!
//! ### Session Registry (`session_registry`)
//! The single source of truth: a map of player ID to session record
//! (public state, owning connection, last activity, outbound queue). It sits
//! behind an `Arc<RwLock<_>>`, so mutations are serialized and reads see a
//! complete map.
//!
//! ### Fanout Router (`router`)
//! Decodes client frames, applies them to the registry and queues the
//! resulting `init`, `player_joined`, `player_update` and `player_left`
//! frames for the right recipients. Each change and its fanout happen under
//! one write lock.
//!
//! ### Connections (`connection`, `network`)
//! One reader task and one writer task per WebSocket. The writer owns the
//! socket sink and drains a bounded queue, so a slow client only ever
//! delays itself.
//!
//! ### Liveness Sweep (`liveness`)
//! A timer that evicts sessions silent for longer than the staleness
//! threshold, covering connections that vanish without a close frame.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = RelayServer::bind(ServerConfig::default()).await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Scalability
//! Every update is fanned out to every other session, so work per message
//! grows linearly with the number of players. That is fine for the small
//! rooms this relay is built for.

pub mod config;
pub mod connection;
pub mod liveness;
pub mod network;
pub mod router;
pub mod session_registry;
