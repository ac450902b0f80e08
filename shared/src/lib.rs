//! Line protocol shared by the session server and its clients.
//!
//! Every message is a single line of text terminated by `\n`. The first
//! whitespace-separated token is the keyword, the remainder is handed to the
//! keyword's handler untouched. Resource payloads are digested with SHA-224
//! and carried as URL-safe base64 so they survive the line framing.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha224};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Port the server listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 8080;

/// Display names must be strictly longer than this many characters.
pub const MIN_NAME_LEN: usize = 2;

/// Errors raised while decoding a line received from the server.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    EmptyLine,

    #[error("unknown message <{0}>")]
    UnknownMessage(String),

    #[error("missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("invalid payload encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// Splits a raw line into its keyword and the remaining argument text.
///
/// Leading whitespace of the remainder is dropped, trailing whitespace is kept
/// (except a `\r` left behind by CRLF senders). Returns `None` for blank lines.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_suffix('\r').unwrap_or(line).trim_start();
    if line.is_empty() {
        return None;
    }
    match line.find(char::is_whitespace) {
        Some(idx) => Some((&line[..idx], line[idx..].trim_start())),
        None => Some((line, "")),
    }
}

/// Content digest advertised in `REQUIRE` lines (lowercase hex SHA-224).
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha224::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Encodes resource bytes for a `WRITE` line.
pub fn encode_payload(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// Reverses [`encode_payload`]
pub fn decode_payload(text: &str) -> Result<Vec<u8>, ProtocolError> {
    Ok(URL_SAFE.decode(text.trim())?)
}

/// Commands sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Login { name: String },
    Logout,
    Status { status: String },
    Game { payload: String },
    Get { scenario: String, resource: String },
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCommand::Login { name } => write!(f, "LOGIN {}", name),
            ClientCommand::Logout => write!(f, "LOGOUT"),
            ClientCommand::Status { status } => write!(f, "STATUS {}", status),
            ClientCommand::Game { payload } => write!(f, "GAME {}", payload),
            ClientCommand::Get { scenario, resource } => {
                write!(f, "GET {} {}", scenario, resource)
            }
        }
    }
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Ok(Option<String>),
    Failed(String),
    Notify(String),
    Load {
        scenario: String,
    },
    Require {
        scenario: String,
        resource: String,
        digest: String,
    },
    Sync {
        scenario: String,
    },
    Write {
        scenario: String,
        resource: String,
        data: String,
    },
    /// Scenario-specific traffic, opaque to the protocol layer.
    Game {
        scenario: String,
        payload: String,
    },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Ok(None) => write!(f, "OK"),
            ServerMessage::Ok(Some(message)) => write!(f, "OK {}", message),
            ServerMessage::Failed(reason) => write!(f, "FAILED {}", reason),
            ServerMessage::Notify(text) => write!(f, "NOTIFY {}", text),
            ServerMessage::Load { scenario } => write!(f, "LOAD {}", scenario),
            ServerMessage::Require {
                scenario,
                resource,
                digest,
            } => write!(f, "REQUIRE {} {} {}", scenario, resource, digest),
            ServerMessage::Sync { scenario } => write!(f, "SYNC {}", scenario),
            ServerMessage::Write {
                scenario,
                resource,
                data,
            } => write!(f, "WRITE {} {} {}", scenario, resource, data),
            ServerMessage::Game { scenario, payload } => {
                write!(f, "GAME {} {}", scenario, payload)
            }
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (keyword, args) = split_line(line).ok_or(ProtocolError::EmptyLine)?;
        let mut tokens = args.split_whitespace();
        let mut next = |what: &'static str| {
            tokens
                .next()
                .map(str::to_string)
                .ok_or(ProtocolError::MissingArgument(what))
        };

        let message = match keyword.to_ascii_uppercase().as_str() {
            "OK" if args.is_empty() => ServerMessage::Ok(None),
            "OK" => ServerMessage::Ok(Some(args.to_string())),
            "FAILED" => ServerMessage::Failed(args.to_string()),
            "NOTIFY" => ServerMessage::Notify(args.to_string()),
            "LOAD" => ServerMessage::Load {
                scenario: next("LOAD")?,
            },
            "REQUIRE" => ServerMessage::Require {
                scenario: next("REQUIRE")?,
                resource: next("REQUIRE")?,
                digest: next("REQUIRE")?,
            },
            "SYNC" => ServerMessage::Sync {
                scenario: next("SYNC")?,
            },
            "WRITE" => ServerMessage::Write {
                scenario: next("WRITE")?,
                resource: next("WRITE")?,
                data: next("WRITE")?,
            },
            "GAME" => {
                let (scenario, payload) =
                    split_line(args).ok_or(ProtocolError::MissingArgument("GAME"))?;
                ServerMessage::Game {
                    scenario: scenario.to_string(),
                    payload: payload.to_string(),
                }
            }
            other => return Err(ProtocolError::UnknownMessage(other.to_string())),
        };
        Ok(message)
    }
}

/// Progress a client reports through `STATUS` while syncing a scenario.
///
/// The well-known values drive the server's sync loop; anything else is kept
/// verbatim as scenario-specific progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// The server has just asked the client to report.
    Init,
    /// The client is still fetching advertised resources.
    WaitRequirement,
    Ready,
    Done,
    Custom(String),
}

impl SyncStatus {
    /// Parses a reported status, case-folding it first.
    pub fn parse(text: &str) -> Self {
        let folded = text.trim().to_lowercase();
        match folded.as_str() {
            "__init__" => SyncStatus::Init,
            "wait requirement" => SyncStatus::WaitRequirement,
            "ready" => SyncStatus::Ready,
            "done" => SyncStatus::Done,
            _ => SyncStatus::Custom(folded),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::Init => "__init__",
            SyncStatus::WaitRequirement => "wait requirement",
            SyncStatus::Ready => "ready",
            SyncStatus::Done => "done",
            SyncStatus::Custom(text) => text,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
