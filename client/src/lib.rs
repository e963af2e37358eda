//! # Game Client Library
//!
//! Headless client for the game session server. It speaks the line protocol
//! from the `shared` crate over TCP and keeps a local view of the game that is
//! rebuilt entirely from server broadcasts; the client never predicts.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! [`WorldView`](game::WorldView): own player id and color, every known
//! player's position, and the phase implied by the responses seen so far.
//!
//! ### Input Module (`input`)
//! Maps typed keys and words (`s`, `p`, `q`, `up`, `move 0.1 0.0`, ...) to
//! protocol requests.
//!
//! ### Network Module (`network`)
//! [`GameConnection`](network::GameConnection) and its split halves for
//! sending requests and reading responses concurrently.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::GameConnection;
//! use shared::ClientRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = GameConnection::connect("127.0.0.1:8080").await?;
//!
//!     // Mark ready; the server broadcasts SRV_RES_START once everyone is
//!     connection.send(&ClientRequest::Start).await?;
//!
//!     while let Some(response) = connection.next_response().await? {
//!         println!("{}", response);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
