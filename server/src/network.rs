//! Server aggregate: shared state, broadcast, and the accept loop

use crate::config::ServerConfig;
use crate::connection;
use crate::game::{GameState, PauseToggle, Phase};
use crate::player::Player;
use crate::session::{Outbound, SessionId, SessionRegistry};
use log::{debug, error, info, warn};
use shared::{ClientRequest, Message, PlayerId, ServerResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinSet;

/// Everything the per-connection tasks share
///
/// Lock order is always `game` then `sessions`. Holders of `sessions` never
/// touch `game`, and no lock is held across socket I/O.
pub struct Server {
    config: ServerConfig,
    game: Mutex<GameState>,
    sessions: Mutex<SessionRegistry>,
    // Wakes every writer waiting on an empty queue
    wakeup: Notify,
    shutdown_tx: watch::Sender<bool>,
    // Mirrors the game phase so the accept loop sees the lobby close
    phase_tx: watch::Sender<Phase>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let (phase_tx, _) = watch::channel(Phase::NotStarted);

        Arc::new(Server {
            game: Mutex::new(GameState::with_max_players(config.max_players)),
            sessions: Mutex::new(SessionRegistry::new()),
            wakeup: Notify::new(),
            shutdown_tx,
            phase_tx,
            config,
        })
    }

    /// Creates the server and binds its listener to `config.address`.
    pub async fn bind(
        config: ServerConfig,
    ) -> Result<(Arc<Self>, TcpListener), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok((Server::new(config), listener))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts connections until `max_connections` sessions have been admitted,
    /// the game leaves the lobby, or shutdown is requested, then waits for
    /// every session to finish.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown = self.shutdown_signal();
        let mut phase = self.phase_tx.subscribe();
        let mut sessions = JoinSet::new();
        let mut admitted = 0;

        while admitted < self.config.max_connections
            && !*shutdown.borrow()
            && *phase.borrow() == Phase::NotStarted
        {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            continue;
                        }
                    };

                    match self.admit(peer).await {
                        Some((session_id, player_id)) => {
                            admitted += 1;
                            info!(
                                "Connected to client {} as session {} (player {}), {}/{} admitted",
                                peer, session_id, player_id, admitted, self.config.max_connections
                            );
                            sessions.spawn(connection::run_session(
                                Arc::clone(&self),
                                session_id,
                                player_id,
                                stream,
                            ));
                        }
                        None => drop(stream),
                    }
                }
                _ = shutdown.changed() => {}
                _ = phase.changed() => {}
            }
        }

        drop(listener);
        info!(
            "No longer admitting players (game {}), waiting for {} sessions",
            *phase.borrow(),
            sessions.len()
        );

        while let Some(result) = sessions.join_next().await {
            if let Err(e) = result {
                error!("Session supervisor failed: {}", e);
            }
        }

        info!("All sessions closed");
        Ok(())
    }

    /// Adds a player for a new connection and registers its session.
    ///
    /// The joiner is told about its own player and everyone already in the
    /// lobby; everyone else hears about the joiner. Returns `None` when the
    /// game refuses the player, in which case no session exists.
    pub async fn admit(&self, peer: SocketAddr) -> Option<(SessionId, PlayerId)> {
        let mut game = self.game.lock().await;

        let player_id = match game.add_player() {
            Ok(id) => id,
            Err(rejection) => {
                warn!("Refusing connection from {}: {}", peer, rejection);
                return None;
            }
        };

        let mut sessions = self.sessions.lock().await;
        let session_id = sessions.register(player_id, peer);

        for player in game.players() {
            let response = if player.id == player_id {
                ServerResponse::YourNewPlayer {
                    id: player.id,
                    x: player.position.0,
                    y: player.position.1,
                    color: player.color,
                }
            } else {
                ServerResponse::NewPlayer {
                    id: player.id,
                    x: player.position.0,
                    y: player.position.1,
                }
            };
            if let Some(message) = frame(&response) {
                sessions.enqueue(session_id, message);
            }

            if player.id == player_id {
                let announcement = ServerResponse::NewPlayer {
                    id: player.id,
                    x: player.position.0,
                    y: player.position.1,
                };
                if let Some(message) = frame(&announcement) {
                    sessions.broadcast_except(Some(session_id), &message);
                }
            }
        }

        self.wakeup.notify_waiters();
        Some((session_id, player_id))
    }

    /// Applies one client command for `player_id` and broadcasts the outcome.
    ///
    /// Rejected commands change nothing and send nothing. The broadcast
    /// happens before the game lock is released, so every client sees state
    /// changes in the order they were made.
    pub async fn handle_request(
        &self,
        player_id: PlayerId,
        request: ClientRequest,
    ) -> Option<ServerResponse> {
        let mut game = self.game.lock().await;

        let outcome = match request {
            ClientRequest::Start => {
                if let Err(rejection) = game.set_ready(player_id) {
                    debug!("Player {} not marked ready: {}", player_id, rejection);
                }
                game.try_start().map(|_| ServerResponse::Start)
            }
            ClientRequest::TogglePause => game.toggle_pause(player_id).map(|toggle| match toggle {
                PauseToggle::Paused => ServerResponse::Pause,
                PauseToggle::Unpaused => ServerResponse::Unpause,
            }),
            ClientRequest::Quit => game.quit(player_id).map(|_| ServerResponse::EndGame),
            ClientRequest::Move { dx, dy } => game
                .move_player(player_id, dx, dy)
                .map(|(x, y)| ServerResponse::Move { id: player_id, x, y }),
        };

        match outcome {
            Ok(response) => {
                let current = game.phase();
                self.phase_tx.send_if_modified(|phase| {
                    let changed = *phase != current;
                    *phase = current;
                    changed
                });

                let delivered = self.broadcast(&response).await;
                info!(
                    "Player {}: {} -> {} (sent to {} sessions)",
                    player_id, request, response, delivered
                );
                drop(game);
                Some(response)
            }
            Err(rejection) => {
                info!("Player {}: {} rejected: {}", player_id, request, rejection);
                None
            }
        }
    }

    /// Queues `response` for every connected session and wakes all writers.
    /// Returns how many sessions it was queued for.
    pub async fn broadcast(&self, response: &ServerResponse) -> usize {
        let Some(message) = frame(response) else {
            return 0;
        };

        let mut sessions = self.sessions.lock().await;
        let delivered = sessions.broadcast(&message);
        self.wakeup.notify_waiters();
        delivered
    }

    /// Waits for the next frame queued for `session_id`.
    ///
    /// Returns `None` once the session is disconnected and its queue has been
    /// drained.
    pub async fn next_outbound(&self, session_id: SessionId) -> Option<Message> {
        loop {
            // Register for the wake-up before looking at the queue so a
            // broadcast landing in between is not missed.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.sessions.lock().await.next_outbound(session_id) {
                Outbound::Send(message) => return Some(message),
                Outbound::Closed => return None,
                Outbound::Idle => {}
            }

            notified.await;
        }
    }

    /// Marks a session disconnected and wakes every writer so its own writer
    /// can observe it.
    pub async fn disconnect(&self, session_id: SessionId) {
        let mut sessions = self.sessions.lock().await;
        if sessions.disconnect(session_id) {
            debug!("Session {} marked disconnected", session_id);
        }
        self.wakeup.notify_waiters();
    }

    pub async fn remove_session(&self, session_id: SessionId) {
        self.sessions.lock().await.remove(session_id);
    }

    /// Stops admission and ends every reader and writer. Frames not yet
    /// written are dropped.
    pub async fn shutdown(&self) {
        info!("Server shutting down");
        self.shutdown_tx.send_replace(true);

        let mut sessions = self.sessions.lock().await;
        sessions.disconnect_all();
        self.wakeup.notify_waiters();
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub async fn phase(&self) -> Phase {
        self.game.lock().await.phase()
    }

    pub async fn player(&self, id: PlayerId) -> Option<Player> {
        self.game.lock().await.player(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn queued(&self, session_id: SessionId) -> usize {
        self.sessions.lock().await.queued(session_id)
    }

    pub async fn is_connected(&self, session_id: SessionId) -> bool {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map_or(false, |session| session.connected)
    }
}

fn frame(response: &ServerResponse) -> Option<Message> {
    match Message::try_from(response) {
        Ok(message) => Some(message),
        Err(e) => {
            error!("Failed to build frame for {}: {}", response, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    async fn drain(server: &Server, session_id: SessionId) -> Vec<String> {
        let mut lines = Vec::new();
        while server.queued(session_id).await > 0 {
            let message = server.next_outbound(session_id).await.unwrap();
            lines.push(message.as_str().trim_end().to_string());
        }
        lines
    }

    async fn lobby(count: usize) -> (Arc<Server>, Vec<(SessionId, PlayerId)>) {
        let server = Server::new(ServerConfig::default().with_max_connections(count));
        let mut joined = Vec::new();
        for _ in 0..count {
            joined.push(server.admit(test_addr()).await.unwrap());
        }
        for (session_id, _) in &joined {
            drain(&server, *session_id).await;
        }
        (server, joined)
    }

    #[tokio::test]
    async fn test_admit_announces_players() {
        let server = Server::new(ServerConfig::default());

        let (first_session, first_player) = server.admit(test_addr()).await.unwrap();
        let (second_session, second_player) = server.admit(test_addr()).await.unwrap();

        let first_lines = drain(&server, first_session).await;
        assert_eq!(first_lines.len(), 2);
        assert!(first_lines[0].starts_with(&format!("SRV_RES_YOUR_NEW_PLAYER {} ", first_player)));
        assert_eq!(
            first_lines[1],
            format!("SRV_RES_NEW_PLAYER {} 0.000000 0.000000", second_player)
        );

        let second_lines = drain(&server, second_session).await;
        assert_eq!(second_lines.len(), 2);
        assert_eq!(
            second_lines[0],
            format!("SRV_RES_NEW_PLAYER {} 0.000000 0.000000", first_player)
        );
        assert!(second_lines[1].starts_with(&format!("SRV_RES_YOUR_NEW_PLAYER {} ", second_player)));
    }

    #[tokio::test]
    async fn test_admit_refused_when_roster_full() {
        let server = Server::new(ServerConfig::default().with_max_players(1));
        assert!(server.admit(test_addr()).await.is_some());
        assert!(server.admit(test_addr()).await.is_none());
        assert_eq!(server.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_start_broadcasts_once_everyone_is_ready() {
        let (server, joined) = lobby(2).await;
        let (_, first) = joined[0];
        let (_, second) = joined[1];

        assert_eq!(server.handle_request(first, ClientRequest::Start).await, None);
        assert_eq!(server.phase().await, Phase::NotStarted);
        for (session_id, _) in &joined {
            assert_eq!(server.queued(*session_id).await, 0);
        }

        assert_eq!(
            server.handle_request(second, ClientRequest::Start).await,
            Some(ServerResponse::Start)
        );
        assert_eq!(server.phase().await, Phase::Running);
        for (session_id, _) in &joined {
            assert_eq!(drain(&server, *session_id).await, vec!["SRV_RES_START"]);
        }
    }

    #[tokio::test]
    async fn test_rejected_move_is_silent() {
        let (server, joined) = lobby(2).await;
        let (session_id, player_id) = joined[0];

        let response = server
            .handle_request(player_id, ClientRequest::Move { dx: 0.2, dy: 0.0 })
            .await;
        assert_eq!(response, None);
        assert_eq!(server.queued(session_id).await, 0);
        assert_eq!(server.player(player_id).await.unwrap().position, (0.0, 0.0));
    }

    #[tokio::test]
    async fn test_pause_flow() {
        let (server, joined) = lobby(2).await;
        let (first_session, first) = joined[0];
        let (_, second) = joined[1];
        server.handle_request(first, ClientRequest::Start).await;
        server.handle_request(second, ClientRequest::Start).await;
        drain(&server, first_session).await;

        assert_eq!(
            server.handle_request(first, ClientRequest::TogglePause).await,
            Some(ServerResponse::Pause)
        );
        assert_eq!(server.handle_request(second, ClientRequest::TogglePause).await, None);
        assert_eq!(server.phase().await, Phase::Paused);
        assert_eq!(
            server.handle_request(first, ClientRequest::TogglePause).await,
            Some(ServerResponse::Unpause)
        );

        assert_eq!(
            drain(&server, first_session).await,
            vec!["SRV_RES_PAUSE", "SRV_RES_UNPAUSE"]
        );
    }

    #[tokio::test]
    async fn test_quit_ends_game_for_everyone() {
        let (server, joined) = lobby(2).await;
        let (_, first) = joined[0];
        let (second_session, second) = joined[1];

        assert_eq!(
            server.handle_request(second, ClientRequest::Quit).await,
            Some(ServerResponse::EndGame)
        );
        assert_eq!(server.phase().await, Phase::Ended);
        assert_eq!(server.handle_request(first, ClientRequest::Quit).await, None);
        assert_eq!(drain(&server, second_session).await, vec!["SRV_RES_END_GAME"]);
    }

    #[tokio::test]
    async fn test_next_outbound_wakes_on_broadcast() {
        let (server, joined) = lobby(1).await;
        let (session_id, _) = joined[0];

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.next_outbound(session_id).await })
        };

        tokio::task::yield_now().await;
        server.broadcast(&ServerResponse::Pause).await;

        let message = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("writer was not woken")
            .unwrap();
        assert_eq!(message.unwrap().as_str(), "SRV_RES_PAUSE\n");
    }

    #[tokio::test]
    async fn test_next_outbound_ends_after_disconnect() {
        let (server, joined) = lobby(1).await;
        let (session_id, _) = joined[0];

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.next_outbound(session_id).await })
        };

        tokio::task::yield_now().await;
        server.disconnect(session_id).await;

        let message = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("writer was not woken")
            .unwrap();
        assert!(message.is_none());
        assert!(!server.is_connected(session_id).await);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_sessions() {
        let (server, joined) = lobby(2).await;
        assert!(!server.is_shutting_down());

        server.shutdown().await;

        assert!(server.is_shutting_down());
        for (session_id, _) in &joined {
            assert!(!server.is_connected(*session_id).await);
            assert_eq!(server.next_outbound(*session_id).await, None);
        }
    }
}
