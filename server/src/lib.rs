//! # Game Session Server Library
//!
//! This library provides the authoritative server for a small multiplayer
//! lobby game. It owns the canonical game state, applies client commands one
//! at a time, and pushes every resulting state change to all connected
//! clients in the same order.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server holds the only writable copy of the roster, player positions
//! and the game phase. Clients send requests; they never change state
//! themselves and learn the outcome only from broadcasts.
//!
//! ### Session Management
//! Handles the lifecycle of each TCP connection:
//! - Admission and player assignment while the lobby has room
//! - One reader task and one writer task per connection
//! - Bounded tolerance for I/O failures and empty lines
//! - Teardown when the client quits, the connection fails, or the server stops
//!
//! ### Ordered Broadcast
//! Every accepted command produces at most one response, which is queued for
//! every connected session while the game lock is still held. All clients
//! therefore observe the same sequence of changes.
//!
//! ## Architecture Design
//!
//! ### Two Locks
//! `GameState` sits behind one mutex held for each whole operation. The
//! session registry and its outbound queues sit behind a second mutex. Locks
//! are always taken game first, and neither is held across socket I/O.
//!
//! ### Line Protocol
//! Frames are newline-terminated ASCII lines shorter than 128 bytes, defined in
//! the `shared` crate. Rejected or unparseable commands are silent: nothing is
//! sent back.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The phase machine and roster:
//! - `NotStarted → Running → Paused ⇄ Running → Ended`
//! - Validated moves inside the `[-1, 1]` field
//! - Rejection reasons for logging
//!
//! ### Session Module (`session`)
//! Registry of connected sessions with FIFO outbound queues.
//!
//! ### Connection Module (`connection`)
//! Reader and writer tasks plus the per-session supervisor.
//!
//! ### Network Module (`network`)
//! The [`Server`](network::Server) aggregate, broadcast, and the accept loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Admit two players on port 8080
//!     let config = ServerConfig::new("127.0.0.1:8080").with_max_connections(2);
//!     let (server, listener) = Server::bind(config).await?;
//!
//!     // Runs until both sessions have ended
//!     server.run(listener).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod game;
pub mod network;
pub mod player;
pub mod session;
