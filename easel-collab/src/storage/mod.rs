//! Persistence for rooms.
//!
//! ```text
//! ┌─────────────┐   save (under room lock)   ┌────────────────┐
//! │ Room        │ ─────────────────────────► │ RoomStore      │
//! │ (in-memory) │                            │ RocksRoomStore │
//! └──────┬──────┘                            │ MemoryRoomStore│
//!        │ on startup: list + load           └───────┬────────┘
//!        ◄───────────────────────────────────────────┘
//! ```
//!
//! A room is stored as one snapshot record keyed by its name. The image is
//! kept in its encoded transport form, so restoring a room is a single
//! `WholeImage` replay.

pub mod memory;
pub mod rocks;

use easel_raster::{Color, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryRoomStore;
pub use rocks::{RocksRoomStore, RoomMetadata, StoreConfig};

/// Everything needed to bring a room back after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub size: Size,
    pub encoded_image: String,
    pub moderator_secret: String,
    pub moderators: Vec<String>,
    pub palette: Vec<Color>,
}

impl RoomSnapshot {
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("compression error: {0}")]
    Compression(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Key-value store of room snapshots.
///
/// Calls are synchronous and made while the room's lock is held, so the
/// last snapshot written for a room is always its most recent state.
pub trait RoomStore: Send + Sync {
    /// Insert or replace the snapshot for `room`.
    fn save(&self, room: &str, snapshot: &RoomSnapshot) -> Result<(), StoreError>;

    fn load(&self, room: &str) -> Result<Option<RoomSnapshot>, StoreError>;

    /// Names of every stored room.
    fn list(&self) -> Result<Vec<String>, StoreError>;
}
