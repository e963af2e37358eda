//! Authoritative game state and its phase machine
//!
//! `GameState` owns the roster and the lifecycle phase. Every method is a
//! complete read-modify-write step; the server wraps the whole value in a
//! single mutex so operations from different sessions never interleave.
//!
//! Rejected operations leave the state untouched and report a [`Rejection`]
//! explaining why. Rejections are ordinary outcomes, not transport errors:
//! callers log them and send nothing to clients.

use crate::player::{generate_color, Player};
use log::info;
use shared::{in_bounds, PlayerId, MAX_PLAYERS};
use std::fmt;
use thiserror::Error;

/// Coarse lifecycle of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Running,
    Paused,
    Ended,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NotStarted => "not started",
            Phase::Running => "running",
            Phase::Paused => "paused",
            Phase::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Why a game operation left the state unchanged
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Rejection {
    #[error("operation not allowed while the game is {0}")]
    WrongPhase(Phase),
    #[error("roster is full ({0} players)")]
    RosterFull(usize),
    #[error("player {0} is not in the game")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is already ready")]
    AlreadyReady(PlayerId),
    #[error("not every player is ready")]
    NotAllReady,
    #[error("player {0} is no longer alive")]
    NotAlive(PlayerId),
    #[error("move by ({dx}, {dy}) is not a finite step")]
    InvalidStep { dx: f32, dy: f32 },
    #[error("target position ({x}, {y}) is out of bounds")]
    OutOfBounds { x: f32, y: f32 },
    #[error("only player {pauser} may unpause the game")]
    NotPauser { pauser: PlayerId },
}

/// Result of a successful pause toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseToggle {
    Paused,
    Unpaused,
}

#[derive(Debug, Clone)]
pub struct GameState {
    phase: Phase,
    players: Vec<Player>,
    paused_by: Option<PlayerId>,
    next_player_id: PlayerId,
    max_players: usize,
}

impl GameState {
    pub fn new() -> Self {
        Self::with_max_players(MAX_PLAYERS)
    }

    pub fn with_max_players(max_players: usize) -> Self {
        Self {
            phase: Phase::NotStarted,
            players: Vec::new(),
            paused_by: None,
            next_player_id: 1,
            max_players,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn paused_by(&self) -> Option<PlayerId> {
        self.paused_by
    }

    /// Players in join order
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, Rejection> {
        self.players
            .iter_mut()
            .find(|player| player.id == id)
            .ok_or(Rejection::UnknownPlayer(id))
    }

    fn require_phase(&self, phase: Phase) -> Result<(), Rejection> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(Rejection::WrongPhase(self.phase))
        }
    }

    /// Adds a new player to the lobby and returns its id.
    ///
    /// Only possible before the game starts and while the roster has room.
    pub fn add_player(&mut self) -> Result<PlayerId, Rejection> {
        self.require_phase(Phase::NotStarted)?;
        if self.players.len() >= self.max_players {
            return Err(Rejection::RosterFull(self.max_players));
        }

        let id = self.next_player_id;
        self.next_player_id += 1;

        let player = Player::new(id, generate_color(&mut rand::thread_rng()));
        info!(
            "Added player {} at ({}, {})",
            id, player.position.0, player.position.1
        );
        self.players.push(player);

        Ok(id)
    }

    pub fn set_ready(&mut self, id: PlayerId) -> Result<(), Rejection> {
        self.require_phase(Phase::NotStarted)?;
        let player = self.player_mut(id)?;
        if player.ready {
            return Err(Rejection::AlreadyReady(id));
        }
        player.ready = true;
        Ok(())
    }

    /// Starts the game if every joined player is ready.
    ///
    /// This is the only way into `Running` from the lobby. Calling it in any
    /// other phase is rejected, so a paused or ended game cannot be restarted
    /// through here.
    pub fn try_start(&mut self) -> Result<(), Rejection> {
        self.require_phase(Phase::NotStarted)?;
        if !self.players.iter().all(|player| player.ready) {
            return Err(Rejection::NotAllReady);
        }
        self.phase = Phase::Running;
        info!("Game started with {} players", self.players.len());
        Ok(())
    }

    /// Moves a player by `(dx, dy)` and returns the committed position.
    ///
    /// The move is all-or-nothing: a target outside the field on either axis
    /// is rejected rather than clamped.
    pub fn move_player(&mut self, id: PlayerId, dx: f32, dy: f32) -> Result<(f32, f32), Rejection> {
        self.require_phase(Phase::Running)?;
        if !dx.is_finite() || !dy.is_finite() {
            return Err(Rejection::InvalidStep { dx, dy });
        }

        let player = self.player_mut(id)?;
        if !player.alive {
            return Err(Rejection::NotAlive(id));
        }

        let target = (player.position.0 + dx, player.position.1 + dy);
        if !in_bounds(target) {
            return Err(Rejection::OutOfBounds {
                x: target.0,
                y: target.1,
            });
        }

        player.position = target;
        Ok(target)
    }

    /// Pauses a running game, or unpauses it when asked by the pauser.
    pub fn toggle_pause(&mut self, id: PlayerId) -> Result<PauseToggle, Rejection> {
        self.player_mut(id)?;

        match (self.phase, self.paused_by) {
            (Phase::Running, _) => {
                self.phase = Phase::Paused;
                self.paused_by = Some(id);
                info!("Game paused by player {}", id);
                Ok(PauseToggle::Paused)
            }
            (Phase::Paused, Some(pauser)) if pauser == id => {
                self.phase = Phase::Running;
                self.paused_by = None;
                info!("Game unpaused by player {}", id);
                Ok(PauseToggle::Unpaused)
            }
            (Phase::Paused, Some(pauser)) => Err(Rejection::NotPauser { pauser }),
            (phase, _) => Err(Rejection::WrongPhase(phase)),
        }
    }

    /// Marks the player dead and ends the match for everyone.
    pub fn quit(&mut self, id: PlayerId) -> Result<(), Rejection> {
        if self.phase == Phase::Ended {
            return Err(Rejection::WrongPhase(Phase::Ended));
        }

        let player = self.player_mut(id)?;
        if !player.alive {
            return Err(Rejection::NotAlive(id));
        }
        player.alive = false;

        self.phase = Phase::Ended;
        self.paused_by = None;
        info!("Player {} quit, game ended", id);
        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
