//! Runtime configuration for the game server

use shared::{ERROR_TOLERANCE, MAX_PLAYERS};

/// Settings the server is started with
///
/// The binary builds this from its command line; tests construct it directly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to, e.g. `127.0.0.1:8080`
    pub address: String,
    /// Sessions admitted before the listener stops accepting
    pub max_connections: usize,
    /// Roster capacity of the game state
    pub max_players: usize,
    /// I/O failures and empty lines a connection absorbs before teardown
    pub error_tolerance: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            max_connections: 2,
            max_players: MAX_PLAYERS,
            error_tolerance: ERROR_TOLERANCE,
        }
    }
}

impl ServerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn with_error_tolerance(mut self, error_tolerance: u32) -> Self {
        self.error_tolerance = error_tolerance;
        self
    }
}
