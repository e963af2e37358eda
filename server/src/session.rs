//! Session registry and per-session outbound queues
//!
//! Every admitted connection gets a [`Session`]: the id of the player it
//! controls, its peer address, a FIFO of frames waiting to be written, and a
//! `connected` flag the reader and writer tasks use to agree on shutdown.
//!
//! The registry is a plain data structure. The server keeps it behind its own
//! mutex and pairs it with a wake-up signal, so pushing to queues and waking
//! writers happens in one critical section.

use log::{debug, info};
use shared::{Message, PlayerId};
use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;

pub type SessionId = u32;

/// Server-side record of one client connection
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier assigned by the registry
    pub id: SessionId,
    /// Player this connection controls; owned by the game state
    pub player_id: PlayerId,
    /// Remote address, for logging
    pub peer: SocketAddr,
    /// Cleared once the reader ends or the writer gives up
    pub connected: bool,
    outbound: VecDeque<Message>,
}

impl Session {
    pub fn new(id: SessionId, player_id: PlayerId, peer: SocketAddr) -> Self {
        Self {
            id,
            player_id,
            peer,
            connected: true,
            outbound: VecDeque::new(),
        }
    }

    pub fn queued(&self) -> usize {
        self.outbound.len()
    }
}

/// What a writer task should do next
#[derive(Debug, PartialEq)]
pub enum Outbound {
    /// Oldest queued frame, already removed from the queue
    Send(Message),
    /// Nothing queued; wait for the next wake-up
    Idle,
    /// Disconnected with an empty queue (or unknown session); stop writing
    Closed,
}

/// All live sessions, in registration order
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    next_session_id: SessionId,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_session_id: 1,
        }
    }

    /// Registers a connection for `player_id` and returns its session id.
    ///
    /// The new session's queue starts empty, so it never sees frames that were
    /// dispatched before this call.
    pub fn register(&mut self, player_id: PlayerId, peer: SocketAddr) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id += 1;

        info!("Session {} registered for player {} ({})", id, player_id, peer);
        self.sessions.insert(id, Session::new(id, player_id, peer));
        id
    }

    /// Removes a session, dropping anything still queued for it.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        if session.queued() > 0 {
            debug!(
                "Session {} removed with {} undelivered frames",
                id,
                session.queued()
            );
        }
        info!("Session {} removed", id);
        Some(session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Queues `message` for a single session. Returns false if the session is
    /// unknown or no longer connected.
    pub fn enqueue(&mut self, id: SessionId, message: Message) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) if session.connected => {
                session.outbound.push_back(message);
                true
            }
            _ => false,
        }
    }

    /// Queues `message` for every connected session and returns how many
    /// queues received it.
    pub fn broadcast(&mut self, message: &Message) -> usize {
        self.broadcast_except(None, message)
    }

    /// Like [`broadcast`](Self::broadcast) but skips `exclude`.
    pub fn broadcast_except(&mut self, exclude: Option<SessionId>, message: &Message) -> usize {
        let mut delivered = 0;
        for session in self.sessions.values_mut() {
            if !session.connected || Some(session.id) == exclude {
                continue;
            }
            session.outbound.push_back(message.clone());
            delivered += 1;
        }
        delivered
    }

    /// Pops the oldest frame for `id`.
    ///
    /// A disconnected session still drains what was queued before it was
    /// marked; only an empty queue reports [`Outbound::Closed`].
    pub fn next_outbound(&mut self, id: SessionId) -> Outbound {
        let Some(session) = self.sessions.get_mut(&id) else {
            return Outbound::Closed;
        };

        match session.outbound.pop_front() {
            Some(message) => Outbound::Send(message),
            None if session.connected => Outbound::Idle,
            None => Outbound::Closed,
        }
    }

    /// Marks a session disconnected. Returns true if it was connected.
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) if session.connected => {
                session.connected = false;
                true
            }
            _ => false,
        }
    }

    pub fn disconnect_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.connected = false;
        }
    }

    pub fn queued(&self, id: SessionId) -> usize {
        self.sessions.get(&id).map_or(0, Session::queued)
    }

    /// Returns the number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
