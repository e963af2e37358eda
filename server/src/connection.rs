//! Per-connection reader and writer tasks
//!
//! Each admitted connection is split into an owned read half and an owned
//! write half. The reader turns lines into commands and applies them through
//! the [`Server`]; the writer drains the session's outbound queue to the
//! socket. A small supervisor joins both before the session is removed, so
//! the socket is always released once both halves are dropped.
//!
//! Both tasks share one error-tolerance policy: every failed read, failed
//! write, EOF, or whitespace-only line spends one unit, and the task stops
//! when the budget is gone. Both also stop on server shutdown; frames still
//! queued at that point are dropped.

use crate::network::Server;
use crate::session::SessionId;
use log::{debug, error, info, warn};
use shared::{ClientRequest, PlayerId, MAX_MESSAGE_LENGTH};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Runs both halves of one session, then removes it from the registry.
pub async fn run_session(
    server: Arc<Server>,
    session_id: SessionId,
    player_id: PlayerId,
    stream: TcpStream,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Session {}: could not disable Nagle: {}", session_id, e);
    }
    let (read_half, write_half) = stream.into_split();

    let reader = tokio::spawn(run_reader(
        Arc::clone(&server),
        session_id,
        player_id,
        read_half,
    ));
    let writer = tokio::spawn(run_writer(Arc::clone(&server), session_id, write_half));

    if let Err(e) = reader.await {
        error!("Session {}: reader task failed: {}", session_id, e);
    }
    // Idempotent; covers a reader that panicked before disconnecting
    server.disconnect(session_id).await;

    if let Err(e) = writer.await {
        error!("Session {}: writer task failed: {}", session_id, e);
    }

    server.remove_session(session_id).await;
    info!("Session {} closed", session_id);
}

/// Reads newline-terminated commands until the tolerance budget is spent,
/// the client quits, or the server shuts down.
pub async fn run_reader<R>(server: Arc<Server>, session_id: SessionId, player_id: PlayerId, reader: R)
where
    R: AsyncRead + Unpin,
{
    info!("Starting reader for session {}", session_id);

    let mut reader = BufReader::new(reader);
    let mut shutdown = server.shutdown_signal();
    let mut tolerance = server.config().error_tolerance;
    let mut line = String::with_capacity(MAX_MESSAGE_LENGTH);

    while tolerance > 0 && !*shutdown.borrow() {
        line.clear();

        let read = tokio::select! {
            read = read_bounded_line(&mut reader, &mut line) => read,
            _ = shutdown.changed() => break,
        };

        match read {
            Ok(0) => {
                tolerance -= 1;
                debug!(
                    "Session {}: nothing to read ({} attempts left)",
                    session_id, tolerance
                );
                continue;
            }
            Err(e) => {
                tolerance -= 1;
                warn!(
                    "Session {}: read failed: {} ({} attempts left)",
                    session_id, e, tolerance
                );
                continue;
            }
            Ok(_) => {}
        }

        if is_blank(&line) {
            tolerance -= 1;
            info!(
                "Session {}: empty message received ({} attempts left)",
                session_id, tolerance
            );
            continue;
        }

        let request = match line.parse::<ClientRequest>() {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    "Session {}: unrecognized command {:?}: {}",
                    session_id,
                    line.trim_end(),
                    e
                );
                continue;
            }
        };

        debug!("Session {}: received {}", session_id, request);
        server.handle_request(player_id, request).await;

        if matches!(request, ClientRequest::Quit) {
            info!("Session {}: client quit", session_id);
            break;
        }
    }

    info!("Terminating reader for session {}", session_id);
    server.disconnect(session_id).await;
}

/// Writes queued frames in order until the session is disconnected and its
/// queue is empty, writes keep failing, or the server shuts down.
pub async fn run_writer<W>(server: Arc<Server>, session_id: SessionId, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    info!("Starting writer for session {}", session_id);

    let mut shutdown = server.shutdown_signal();
    let mut tolerance = server.config().error_tolerance;

    while tolerance > 0 && !*shutdown.borrow() {
        let Some(message) = server.next_outbound(session_id).await else {
            break;
        };

        // A peer that stops reading must not hold up shutdown
        let written = tokio::select! {
            written = writer.write_all(message.as_bytes()) => written,
            _ = shutdown.changed() => {
                info!(
                    "Session {}: shutting down with {} frames undelivered",
                    session_id,
                    server.queued(session_id).await + 1
                );
                break;
            }
        };

        if let Err(e) = written {
            tolerance -= 1;
            warn!(
                "Session {}: could not write {:?}: {} ({} attempts left)",
                session_id,
                message.as_str().trim_end(),
                e,
                tolerance
            );
        }
    }

    if tolerance == 0 {
        // Stop queueing frames nobody will write
        server.disconnect(session_id).await;
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Session {}: shutdown of write half failed: {}", session_id, e);
    }
    info!("Terminating writer for session {}", session_id);
}

/// True for lines holding only whitespace or NUL padding.
fn is_blank(line: &str) -> bool {
    line.trim_matches(|c: char| c.is_whitespace() || c == '\0').is_empty()
}

/// Reads one line of at most `MAX_MESSAGE_LENGTH` bytes into `line`.
///
/// A longer line is split: the rest is returned by the next call.
async fn read_bounded_line<R>(reader: &mut R, line: &mut String) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = (&mut *reader).take(MAX_MESSAGE_LENGTH as u64);
    limited.read_line(line).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::Phase;
    use shared::ServerResponse;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    async fn server_with(tolerance: u32, players: usize) -> (Arc<Server>, Vec<(SessionId, PlayerId)>) {
        let server = Server::new(ServerConfig::default().with_error_tolerance(tolerance));
        let mut joined = Vec::new();
        for _ in 0..players {
            joined.push(server.admit(test_addr()).await.unwrap());
        }
        // Drop the join announcements
        for (session_id, _) in &joined {
            while server.queued(*session_id).await > 0 {
                server.next_outbound(*session_id).await;
            }
        }
        (server, joined)
    }

    #[tokio::test]
    async fn test_reader_applies_start() {
        let (server, joined) = server_with(2, 2).await;
        let (first_session, first) = joined[0];
        let (second_session, second) = joined[1];

        let mock = Builder::new().read(b"CLT_REQ_START\n").build();
        run_reader(Arc::clone(&server), first_session, first, mock).await;
        assert!(server.player(first).await.unwrap().ready);
        assert_eq!(server.phase().await, Phase::NotStarted);
        assert!(!server.is_connected(first_session).await);

        let mock = Builder::new().read(b"CLT_REQ_START\r\n").build();
        run_reader(Arc::clone(&server), second_session, second, mock).await;
        assert_eq!(server.phase().await, Phase::Running);
        assert_eq!(
            server.next_outbound(second_session).await.unwrap().as_str(),
            "SRV_RES_START\n"
        );
    }

    #[tokio::test]
    async fn test_reader_stops_after_empty_lines() {
        let (server, joined) = server_with(3, 1).await;
        let (session_id, player_id) = joined[0];

        let mock = Builder::new().read(b"\n  \r\n\nCLT_REQ_START\n").build();
        run_reader(Arc::clone(&server), session_id, player_id, mock).await;

        assert!(!server.player(player_id).await.unwrap().ready);
        assert!(!server.is_connected(session_id).await);
    }

    #[tokio::test]
    async fn test_reader_counts_nul_padding_as_empty() {
        let (server, joined) = server_with(2, 1).await;
        let (session_id, player_id) = joined[0];

        let mock = Builder::new().read(b"\0\0\0\n\0 \r\nCLT_REQ_START\n").build();
        run_reader(Arc::clone(&server), session_id, player_id, mock).await;

        assert!(!server.player(player_id).await.unwrap().ready);
        assert!(!server.is_connected(session_id).await);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank("\n"));
        assert!(is_blank(" \t\r\n"));
        assert!(is_blank("\0\0\n"));
        assert!(!is_blank("CLT_REQ_START\0\n"));
    }

    #[tokio::test]
    async fn test_reader_ignores_unparseable_lines() {
        let (server, joined) = server_with(1, 1).await;
        let (session_id, player_id) = joined[0];

        let mock = Builder::new()
            .read(b"HELLO\n")
            .read(b"CLT_REQ_MOVE left right\n")
            .read(b"CLT_REQ_START\n")
            .build();
        run_reader(Arc::clone(&server), session_id, player_id, mock).await;

        assert!(server.player(player_id).await.unwrap().ready);
        // Single player lobby starts as soon as that player is ready
        assert_eq!(server.phase().await, Phase::Running);
    }

    #[tokio::test]
    async fn test_reader_spends_tolerance_on_read_errors() {
        let (server, joined) = server_with(2, 1).await;
        let (session_id, player_id) = joined[0];

        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        run_reader(Arc::clone(&server), session_id, player_id, mock).await;

        assert!(!server.is_connected(session_id).await);
        assert_eq!(server.phase().await, Phase::NotStarted);
    }

    #[tokio::test]
    async fn test_reader_move_before_start_is_silent() {
        let (server, joined) = server_with(1, 2).await;
        let (session_id, player_id) = joined[0];
        let (other_session, _) = joined[1];

        let mock = Builder::new().read(b"CLT_REQ_MOVE 0.2 0.0\n").build();
        run_reader(Arc::clone(&server), session_id, player_id, mock).await;

        assert_eq!(server.player(player_id).await.unwrap().position, (0.0, 0.0));
        assert_eq!(server.queued(session_id).await, 0);
        assert_eq!(server.queued(other_session).await, 0);
    }

    #[tokio::test]
    async fn test_reader_exits_on_quit() {
        let (server, joined) = server_with(5, 2).await;
        let (session_id, player_id) = joined[0];
        let (other_session, _) = joined[1];

        let mock = Builder::new().read(b"CLT_REQ_QUIT\n").build();
        run_reader(Arc::clone(&server), session_id, player_id, mock).await;

        assert_eq!(server.phase().await, Phase::Ended);
        assert!(!server.is_connected(session_id).await);
        assert!(server.is_connected(other_session).await);

        // Quitter still gets the frame that was queued before it disconnected
        assert_eq!(
            server.next_outbound(session_id).await.unwrap().as_str(),
            "SRV_RES_END_GAME\n"
        );
        assert_eq!(server.next_outbound(session_id).await, None);
        assert_eq!(server.queued(other_session).await, 1);
    }

    #[tokio::test]
    async fn test_reader_stops_on_shutdown() {
        let (server, joined) = server_with(5, 1).await;
        let (session_id, player_id) = joined[0];

        // Keep the client end open so the reader blocks on the socket
        let (_client, server_end) = tokio::io::duplex(MAX_MESSAGE_LENGTH);
        let reader = tokio::spawn(run_reader(
            Arc::clone(&server),
            session_id,
            player_id,
            server_end,
        ));

        tokio::task::yield_now().await;
        server.shutdown().await;

        timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader did not observe shutdown")
            .unwrap();
        assert!(!server.is_connected(session_id).await);
    }

    #[tokio::test]
    async fn test_writer_drains_queue_in_order() {
        let (server, joined) = server_with(5, 1).await;
        let (session_id, _) = joined[0];

        server.broadcast(&ServerResponse::Start).await;
        server.broadcast(&ServerResponse::Move { id: 1, x: 0.1, y: 0.0 }).await;
        server.broadcast(&ServerResponse::EndGame).await;
        server.disconnect(session_id).await;

        let mock = Builder::new()
            .write(b"SRV_RES_START\n")
            .write(b"SRV_RES_MOVE 1 0.100000 0.000000\n")
            .write(b"SRV_RES_END_GAME\n")
            .build();
        run_writer(Arc::clone(&server), session_id, mock).await;

        assert_eq!(server.queued(session_id).await, 0);
    }

    #[tokio::test]
    async fn test_writer_waits_for_broadcast() {
        let (server, joined) = server_with(5, 1).await;
        let (session_id, _) = joined[0];

        let mock = Builder::new().write(b"SRV_RES_PAUSE\n").build();
        let writer = tokio::spawn(run_writer(Arc::clone(&server), session_id, mock));

        tokio::task::yield_now().await;
        server.broadcast(&ServerResponse::Pause).await;
        tokio::task::yield_now().await;
        server.disconnect(session_id).await;

        timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer did not finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_writer_gives_up_after_failures() {
        let (server, joined) = server_with(2, 1).await;
        let (session_id, _) = joined[0];

        server.broadcast(&ServerResponse::Start).await;
        server.broadcast(&ServerResponse::Pause).await;
        server.broadcast(&ServerResponse::Unpause).await;

        let mock = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .build();
        run_writer(Arc::clone(&server), session_id, mock).await;

        assert!(!server.is_connected(session_id).await);
        assert_eq!(server.queued(session_id).await, 1);
        assert_eq!(server.broadcast(&ServerResponse::Start).await, 0);
    }

    #[tokio::test]
    async fn test_writer_stops_on_shutdown_with_stalled_peer() {
        let (server, joined) = server_with(5, 1).await;
        let (session_id, _) = joined[0];

        for step in 1..=4 {
            let x = step as f32 / 10.0;
            server.broadcast(&ServerResponse::Move { id: 1, x, y: 0.0 }).await;
        }

        // Peer stays open but never reads; the first frame does not fit
        let (_client, server_end) = tokio::io::duplex(16);
        let writer = tokio::spawn(run_writer(Arc::clone(&server), session_id, server_end));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.queued(session_id).await, 3);
        server.shutdown().await;

        timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer did not observe shutdown")
            .unwrap();
        assert!(!server.is_connected(session_id).await);
        // Undelivered frames are dropped, not written
        assert_eq!(server.queued(session_id).await, 3);
    }
}
