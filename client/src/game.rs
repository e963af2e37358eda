use log::debug;
use shared::{PlayerId, ServerResponse};
use std::collections::BTreeMap;

/// Phase as far as this client can tell from broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Lobby,
    Running,
    Paused,
    Ended,
}

/// Client-side mirror of the server's state, rebuilt purely from responses
#[derive(Debug, Clone)]
pub struct WorldView {
    pub own_id: Option<PlayerId>,
    pub own_color: Option<(f32, f32, f32)>,
    pub players: BTreeMap<PlayerId, (f32, f32)>,
    pub phase: ViewPhase,
}

impl WorldView {
    pub fn new() -> Self {
        Self {
            own_id: None,
            own_color: None,
            players: BTreeMap::new(),
            phase: ViewPhase::Lobby,
        }
    }

    pub fn apply_response(&mut self, response: &ServerResponse) {
        match *response {
            ServerResponse::Start | ServerResponse::Unpause => self.phase = ViewPhase::Running,
            ServerResponse::Pause => self.phase = ViewPhase::Paused,
            ServerResponse::EndGame => self.phase = ViewPhase::Ended,
            ServerResponse::Move { id, x, y } | ServerResponse::NewPlayer { id, x, y } => {
                self.players.insert(id, (x, y));
            }
            ServerResponse::YourNewPlayer { id, x, y, color } => {
                self.own_id = Some(id);
                self.own_color = Some(color);
                self.players.insert(id, (x, y));
            }
        }
        debug!("View after {}: {:?}", response, self.phase);
    }

    pub fn own_position(&self) -> Option<(f32, f32)> {
        self.own_id.and_then(|id| self.players.get(&id).copied())
    }
}

impl Default for WorldView {
    fn default() -> Self {
        Self::new()
    }
}
