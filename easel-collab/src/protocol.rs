//! JSON packet protocol spoken over WebSocket text frames.
//!
//! Every packet is an object with a `type` discriminator:
//! ```text
//! client → server   connect | operation | moderator | palette | ping
//! server → client   connected | userList | sync | palette | promoted | kicked | ping
//! ```
//!
//! The first packet a client sends must be `connect`.

use easel_raster::{Color, Operation, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packets accepted from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientPacket {
    /// Bind this connection to `room` under the display name `name`.
    Connect { room: String, name: String },
    Operation { operation: Operation },
    Moderator { password: String, data: ModeratorAction },
    Palette { data: PaletteAction },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ModeratorAction {
    Promote { username: String },
    Kick { username: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PaletteAction {
    Add { color: Color },
    /// Any JSON number is accepted; the room ignores indices that do not
    /// name an existing entry.
    Remove { index: serde_json::Number },
}

/// Packets sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerPacket {
    Connected { size: Size },
    UserList { users: Vec<UserListEntry> },
    /// Full current image as an encoded URL.
    Sync { url: String },
    Palette { data: PaletteSync },
    /// Sent to a newly promoted user; carries the room's moderator secret.
    Promoted { password: String },
    Kicked,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PaletteSync {
    Sync { colors: Vec<Color> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListEntry {
    pub username: String,
    pub moderator: bool,
}

/// WebSocket close code and reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

impl CloseReason {
    pub const KICKED: CloseReason = CloseReason::new(1000, "kicked");
    pub const UNEXPECTED_BINARY: CloseReason = CloseReason::new(1003, "unexpected binary");
    pub const UNEXPECTED_BINARY_MESSAGE: CloseReason =
        CloseReason::new(1003, "unexpected binary message");
    pub const MALFORMED_PACKET: CloseReason = CloseReason::new(1007, "malformed packet");
    pub const NO_CONNECT: CloseReason = CloseReason::new(1008, "no connect");
    pub const ROOM_DOES_NOT_EXIST: CloseReason = CloseReason::new(1008, "room does not exist");
    pub const QUEUE_OVERFLOW: CloseReason = CloseReason::new(1008, "outbound queue overflow");

    pub const fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode packet: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ClientPacket {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl ServerPacket {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}
