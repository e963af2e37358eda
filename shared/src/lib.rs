//! Line protocol shared by the game server and its clients.
//!
//! Every frame is a single newline-terminated ASCII line of at most
//! [`MAX_MESSAGE_LENGTH`] bytes. Clients send [`ClientRequest`]s, the server
//! broadcasts [`ServerResponse`]s. Both types parse with [`FromStr`] and render
//! with [`Display`](fmt::Display), so the two sides never disagree on the
//! grammar.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const MAX_MESSAGE_LENGTH: usize = 128;
pub const MAX_PLAYERS: usize = 4;
pub const ERROR_TOLERANCE: u32 = 5;
pub const WORLD_MIN: f32 = -1.0;
pub const WORLD_MAX: f32 = 1.0;

pub const CLT_REQ_START: &str = "CLT_REQ_START";
pub const CLT_REQ_TOGGLE_PAUSE: &str = "CLT_REQ_TOGGLE_PAUSE";
pub const CLT_REQ_QUIT: &str = "CLT_REQ_QUIT";
pub const CLT_REQ_MOVE: &str = "CLT_REQ_MOVE";

pub const SRV_RES_START: &str = "SRV_RES_START";
pub const SRV_RES_PAUSE: &str = "SRV_RES_PAUSE";
pub const SRV_RES_UNPAUSE: &str = "SRV_RES_UNPAUSE";
pub const SRV_RES_END_GAME: &str = "SRV_RES_END_GAME";
pub const SRV_RES_MOVE: &str = "SRV_RES_MOVE";
pub const SRV_RES_NEW_PLAYER: &str = "SRV_RES_NEW_PLAYER";
pub const SRV_RES_YOUR_NEW_PLAYER: &str = "SRV_RES_YOUR_NEW_PLAYER";

/// Player identifier. Zero never names a player.
pub type PlayerId = u32;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("`{command}` expects {expected} argument(s), got {got}")]
    ArgumentCount {
        command: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("message of {0} bytes is not shorter than the {max}-byte limit", max = MAX_MESSAGE_LENGTH)]
    TooLong(usize),
}

/// Commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientRequest {
    Start,
    TogglePause,
    Quit,
    Move { dx: f32, dy: f32 },
}

/// Responses the server broadcasts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerResponse {
    Start,
    Pause,
    Unpause,
    EndGame,
    Move {
        id: PlayerId,
        x: f32,
        y: f32,
    },
    NewPlayer {
        id: PlayerId,
        x: f32,
        y: f32,
    },
    YourNewPlayer {
        id: PlayerId,
        x: f32,
        y: f32,
        color: (f32, f32, f32),
    },
}

impl FromStr for ClientRequest {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().ok_or(ProtocolError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        match command {
            CLT_REQ_START => no_args(CLT_REQ_START, &args).map(|_| ClientRequest::Start),
            CLT_REQ_TOGGLE_PAUSE => {
                no_args(CLT_REQ_TOGGLE_PAUSE, &args).map(|_| ClientRequest::TogglePause)
            }
            CLT_REQ_QUIT => no_args(CLT_REQ_QUIT, &args).map(|_| ClientRequest::Quit),
            CLT_REQ_MOVE => {
                let [dx, dy] = floats::<2>(CLT_REQ_MOVE, &args)?;
                Ok(ClientRequest::Move { dx, dy })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ClientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientRequest::Start => f.write_str(CLT_REQ_START),
            ClientRequest::TogglePause => f.write_str(CLT_REQ_TOGGLE_PAUSE),
            ClientRequest::Quit => f.write_str(CLT_REQ_QUIT),
            ClientRequest::Move { dx, dy } => write!(f, "{} {:.6} {:.6}", CLT_REQ_MOVE, dx, dy),
        }
    }
}

impl FromStr for ServerResponse {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().ok_or(ProtocolError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        match command {
            SRV_RES_START => no_args(SRV_RES_START, &args).map(|_| ServerResponse::Start),
            SRV_RES_PAUSE => no_args(SRV_RES_PAUSE, &args).map(|_| ServerResponse::Pause),
            SRV_RES_UNPAUSE => no_args(SRV_RES_UNPAUSE, &args).map(|_| ServerResponse::Unpause),
            SRV_RES_END_GAME => no_args(SRV_RES_END_GAME, &args).map(|_| ServerResponse::EndGame),
            SRV_RES_MOVE => {
                let (id, [x, y]) = id_and_floats::<2>(SRV_RES_MOVE, &args)?;
                Ok(ServerResponse::Move { id, x, y })
            }
            SRV_RES_NEW_PLAYER => {
                let (id, [x, y]) = id_and_floats::<2>(SRV_RES_NEW_PLAYER, &args)?;
                Ok(ServerResponse::NewPlayer { id, x, y })
            }
            SRV_RES_YOUR_NEW_PLAYER => {
                let (id, [x, y, r, g, b]) = id_and_floats::<5>(SRV_RES_YOUR_NEW_PLAYER, &args)?;
                Ok(ServerResponse::YourNewPlayer {
                    id,
                    x,
                    y,
                    color: (r, g, b),
                })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ServerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerResponse::Start => f.write_str(SRV_RES_START),
            ServerResponse::Pause => f.write_str(SRV_RES_PAUSE),
            ServerResponse::Unpause => f.write_str(SRV_RES_UNPAUSE),
            ServerResponse::EndGame => f.write_str(SRV_RES_END_GAME),
            ServerResponse::Move { id, x, y } => {
                write!(f, "{} {} {:.6} {:.6}", SRV_RES_MOVE, id, x, y)
            }
            ServerResponse::NewPlayer { id, x, y } => {
                write!(f, "{} {} {:.6} {:.6}", SRV_RES_NEW_PLAYER, id, x, y)
            }
            ServerResponse::YourNewPlayer { id, x, y, color } => write!(
                f,
                "{} {} {:.6} {:.6} {:.6} {:.6} {:.6}",
                SRV_RES_YOUR_NEW_PLAYER, id, x, y, color.0, color.1, color.2
            ),
        }
    }
}

fn no_args(command: &'static str, args: &[&str]) -> Result<(), ProtocolError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::ArgumentCount {
            command,
            expected: 0,
            got: args.len(),
        })
    }
}

fn floats<const N: usize>(command: &'static str, args: &[&str]) -> Result<[f32; N], ProtocolError> {
    if args.len() != N {
        return Err(ProtocolError::ArgumentCount {
            command,
            expected: N,
            got: args.len(),
        });
    }

    let mut values = [0.0; N];
    for (value, token) in values.iter_mut().zip(args) {
        *value = parse_finite(token)?;
    }
    Ok(values)
}

fn id_and_floats<const N: usize>(
    command: &'static str,
    args: &[&str],
) -> Result<(PlayerId, [f32; N]), ProtocolError> {
    if args.len() != N + 1 {
        return Err(ProtocolError::ArgumentCount {
            command,
            expected: N + 1,
            got: args.len(),
        });
    }

    let id = args[0]
        .parse::<PlayerId>()
        .map_err(|_| ProtocolError::InvalidNumber(args[0].to_string()))?;
    let values = floats::<N>(command, &args[1..])?;
    Ok((id, values))
}

fn parse_finite(token: &str) -> Result<f32, ProtocolError> {
    match token.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ProtocolError::InvalidNumber(token.to_string())),
    }
}

/// One outbound frame: a newline-terminated line shared between every
/// session queue it was dispatched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Arc<str>);

impl Message {
    /// Builds a frame from `line`, appending the terminating newline if missing.
    ///
    /// The frame, newline included, must be shorter than `MAX_MESSAGE_LENGTH`.
    pub fn new(line: impl Into<String>) -> Result<Self, ProtocolError> {
        let mut text = line.into();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        if text.len() >= MAX_MESSAGE_LENGTH {
            return Err(ProtocolError::TooLong(text.len()));
        }
        Ok(Message(text.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&ServerResponse> for Message {
    type Error = ProtocolError;

    fn try_from(response: &ServerResponse) -> Result<Self, Self::Error> {
        Message::new(response.to_string())
    }
}

impl TryFrom<&ClientRequest> for Message {
    type Error = ProtocolError;

    fn try_from(request: &ClientRequest) -> Result<Self, Self::Error> {
        Message::new(request.to_string())
    }
}

/// Returns true when `position` lies inside the playing field on both axes.
pub fn in_bounds(position: (f32, f32)) -> bool {
    (WORLD_MIN..=WORLD_MAX).contains(&position.0) && (WORLD_MIN..=WORLD_MAX).contains(&position.1)
}
