//! # easel-collab: Real-time room synchronization for Easel
//!
//! Clients join a named room over a WebSocket, submit drawing operations, and
//! every member converges on the room's authoritative image.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   JSON packets    ┌─────────────┐
//! │ Client      │ ◄───────────────► │ DrawServer  │
//! │ (browser)   │    WebSocket      │ (tokio)     │
//! └─────────────┘                   └──────┬──────┘
//!                                          │ Session per connection
//!                                   ┌──────┴──────┐
//!                                   │RoomRegistry │
//!                                   └──────┬──────┘
//!                                          │
//!                          ┌───────────────┼───────────────┐
//!                          ▼               ▼               ▼
//!                    ┌──────────┐   ┌────────────┐   ┌───────────┐
//!                    │ Surface  │   │OperationLog│   │ RoomStore │
//!                    │ (pixels) │   │ (compacts) │   │ (RocksDB) │
//!                    └──────────┘   └────────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire packets and close reasons
//! - [`oplog`]: Operation log with compaction into a whole image
//! - [`user`]: Connected user handle with a bounded outbound queue
//! - [`broadcast`]: Room fan-out and counters
//! - [`room`]: Authoritative room state
//! - [`registry`]: Room lookup, creation and restore
//! - [`connection`]: Per-connection protocol state machine
//! - [`server`]: WebSocket server
//! - [`storage`]: Room snapshot persistence
//! - [`api`]: HTTP-boundary handlers

pub mod api;
pub mod broadcast;
pub mod connection;
pub mod oplog;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod storage;
pub mod user;

// Re-exports for convenience
pub use api::{ApiBody, ApiResponse, CreateRoomRequest};
pub use broadcast::RoomStats;
pub use connection::{InboundFrame, Session, SessionState, Step};
pub use oplog::{LogEntry, OperationLog, DEFAULT_COMPACTION_THRESHOLD};
pub use protocol::{
    ClientPacket, CloseReason, ModeratorAction, PaletteAction, PaletteSync, ProtocolError,
    ServerPacket, UserListEntry,
};
pub use registry::{RegistryError, RoomInfo, RoomRegistry};
pub use room::{Room, RoomConfig};
pub use server::{DrawServer, ServerConfig, ServerError, ServerStats};
pub use storage::{
    MemoryRoomStore, RocksRoomStore, RoomMetadata, RoomSnapshot, RoomStore, StoreConfig,
    StoreError,
};
pub use user::{outbound_channel, Delivery, Inbox, Outbound, Outbox, User};
