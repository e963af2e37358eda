use crate::game::WorldView;
use log::{debug, info, warn};
use shared::{ClientRequest, Message, ServerResponse, MAX_MESSAGE_LENGTH};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Write side of a server connection
pub struct RequestSender {
    writer: OwnedWriteHalf,
}

impl RequestSender {
    pub async fn send(&mut self, request: &ClientRequest) -> io::Result<()> {
        let message = Message::try_from(request)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        debug!("Sending {}", request);
        self.writer.write_all(message.as_bytes()).await
    }

    /// Sends `line` verbatim, newline appended. Nothing is validated.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await
    }

    pub async fn close(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Read side of a server connection
pub struct ResponseReceiver {
    reader: BufReader<OwnedReadHalf>,
    line: String,
}

impl ResponseReceiver {
    /// Next raw line without its terminator, or `None` once the server closed
    /// the connection.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(self.line.trim_end().to_string()))
    }

    /// Next well-formed response. Lines that do not parse are logged and
    /// skipped.
    pub async fn next_response(&mut self) -> io::Result<Option<ServerResponse>> {
        while let Some(line) = self.next_line().await? {
            match line.parse::<ServerResponse>() {
                Ok(response) => return Ok(Some(response)),
                Err(e) => warn!("Ignoring server line {:?}: {}", line, e),
            }
        }
        Ok(None)
    }
}

/// A connection to the game server plus the view built from its broadcasts
pub struct GameConnection {
    sender: RequestSender,
    receiver: ResponseReceiver,
    pub view: WorldView,
}

impl GameConnection {
    pub async fn connect(server_addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to server at {}", stream.peer_addr()?);

        let (read_half, write_half) = stream.into_split();
        Ok(GameConnection {
            sender: RequestSender { writer: write_half },
            receiver: ResponseReceiver {
                reader: BufReader::new(read_half),
                line: String::with_capacity(MAX_MESSAGE_LENGTH),
            },
            view: WorldView::new(),
        })
    }

    pub async fn send(&mut self, request: &ClientRequest) -> io::Result<()> {
        self.sender.send(request).await
    }

    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.sender.send_line(line).await
    }

    /// Waits for the next response and applies it to the view.
    pub async fn next_response(&mut self) -> io::Result<Option<ServerResponse>> {
        let response = self.receiver.next_response().await?;
        if let Some(response) = &response {
            self.view.apply_response(response);
        }
        Ok(response)
    }

    pub fn into_parts(self) -> (RequestSender, ResponseReceiver, WorldView) {
        (self.sender, self.receiver, self.view)
    }
}
