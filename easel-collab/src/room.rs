//! A named drawing room: users, moderation, palette and the shared image.
//!
//! All mutable state sits behind one async mutex. Each inbound packet is
//! handled in a single pass under that lock: mutate, broadcast, persist.
//!
//! ```text
//! packet ──► lock ──► mutate state ──► broadcast_locked ──► persist ──► unlock
//!                         │                   │                 │
//!                     Surface + log      user outboxes      RoomStore
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use easel_raster::{CodecError, Color, ImageCodec, Operation, Size, Surface};
use indexmap::{IndexMap, IndexSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::broadcast::{fan_out, AtomicRoomStats, RoomStats};
use crate::oplog::{OperationLog, DEFAULT_COMPACTION_THRESHOLD};
use crate::protocol::{ModeratorAction, PaletteAction, PaletteSync, ServerPacket, UserListEntry};
use crate::storage::{RoomSnapshot, RoomStore};
use crate::user::{Delivery, User};

/// Per-room tuning shared by every room of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Log length at which it is collapsed into one whole image
    pub compaction_threshold: usize,
    /// Largest accepted canvas width or height
    pub max_canvas_dimension: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            max_canvas_dimension: 4096,
        }
    }
}

struct RoomState {
    /// Keyed by display name, in join order.
    users: IndexMap<String, Arc<User>>,
    moderators: IndexSet<String>,
    palette: Vec<Color>,
    log: OperationLog,
    surface: Surface,
    /// Encoding of `surface`, refreshed lazily once `dirty` is set.
    encoded: String,
    dirty: Arc<AtomicBool>,
}

impl RoomState {
    fn new(size: Size, codec: Arc<dyn ImageCodec>, config: &RoomConfig) -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let mut surface = Surface::new(size, codec);
        let flag = dirty.clone();
        surface.subscribe_draw(move || flag.store(true, Ordering::Release));
        Self {
            users: IndexMap::new(),
            moderators: IndexSet::new(),
            palette: Vec::new(),
            log: OperationLog::new(config.compaction_threshold),
            surface,
            encoded: String::new(),
            dirty,
        }
    }

    /// Current image in transport form.
    fn current_image(&mut self) -> Result<&str, CodecError> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            match self.surface.encode() {
                Ok(encoded) => self.encoded = encoded,
                Err(e) => {
                    self.dirty.store(true, Ordering::Release);
                    return Err(e);
                }
            }
        }
        Ok(&self.encoded)
    }

    fn user_list(&self) -> ServerPacket {
        ServerPacket::UserList {
            users: self
                .users
                .keys()
                .map(|username| UserListEntry {
                    username: username.clone(),
                    moderator: self.moderators.contains(username),
                })
                .collect(),
        }
    }

    fn palette_sync(&self) -> ServerPacket {
        ServerPacket::Palette {
            data: PaletteSync::Sync { colors: self.palette.clone() },
        }
    }

    fn snapshot(&mut self, size: Size, moderator_secret: &str) -> Result<RoomSnapshot, CodecError> {
        Ok(RoomSnapshot {
            size,
            encoded_image: self.current_image()?.to_string(),
            moderator_secret: moderator_secret.to_string(),
            moderators: self.moderators.iter().cloned().collect(),
            palette: self.palette.clone(),
        })
    }
}

pub struct Room {
    name: String,
    size: Size,
    moderator_secret: String,
    store: Arc<dyn RoomStore>,
    stats: AtomicRoomStats,
    state: Mutex<RoomState>,
}

impl Room {
    /// Create a fresh room with `creator` as its only moderator and persist it.
    pub fn create(
        name: impl Into<String>,
        size: Size,
        creator: impl Into<String>,
        config: &RoomConfig,
        codec: Arc<dyn ImageCodec>,
        store: Arc<dyn RoomStore>,
    ) -> Result<Self, CodecError> {
        let mut state = RoomState::new(size, codec, config);
        state.moderators.insert(creator.into());
        state.current_image()?;

        let moderator_secret = Uuid::new_v4().simple().to_string();
        let snapshot = state.snapshot(size, &moderator_secret);
        let room = Self {
            name: name.into(),
            size,
            moderator_secret,
            store,
            stats: AtomicRoomStats::default(),
            state: Mutex::new(state),
        };
        room.persist(snapshot);
        Ok(room)
    }

    /// Rebuild a room from its persisted snapshot.
    ///
    /// The log is seeded with the stored image; nothing is broadcast or
    /// written back.
    pub fn restore(
        name: impl Into<String>,
        snapshot: RoomSnapshot,
        config: &RoomConfig,
        codec: Arc<dyn ImageCodec>,
        store: Arc<dyn RoomStore>,
    ) -> Result<Self, CodecError> {
        let mut state = RoomState::new(snapshot.size, codec.clone(), config);
        // Decode up front so a corrupt image rejects the record.
        codec.decode(&snapshot.encoded_image)?;

        state.moderators.extend(snapshot.moderators);
        state.palette = snapshot.palette;
        state.log.push("", Operation::WholeImage { url: snapshot.encoded_image });
        state.log.replay(&mut state.surface);
        state.current_image()?;

        Ok(Self {
            name: name.into(),
            size: snapshot.size,
            moderator_secret: snapshot.moderator_secret,
            store,
            stats: AtomicRoomStats::default(),
            state: Mutex::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn moderator_secret(&self) -> &str {
        &self.moderator_secret
    }

    pub fn stats(&self) -> RoomStats {
        self.stats.snapshot()
    }

    // ─── Membership ───────────────────────────────────────────────────

    /// Register a connection under its display name.
    ///
    /// A user already holding the name is superseded in place. The new user
    /// gets `connected` first, then everyone receives the image, user list
    /// and palette.
    pub async fn add_user(&self, user: Arc<User>) {
        let mut state = self.state.lock().await;

        match (ServerPacket::Connected { size: self.size }).encode() {
            Ok(text) => {
                user.send_text(text.into());
            }
            Err(e) => log::error!("Failed to encode connected packet: {e}"),
        }

        let name = user.name().to_string();
        if let Some(previous) = state.users.insert(name.clone(), user) {
            log::debug!("{name:?} reconnected to {}, superseding {}", self.name, previous.id());
        }
        log::info!("{name:?} joined room {} ({} users)", self.name, state.users.len());

        match state.current_image() {
            Ok(url) => {
                let sync = ServerPacket::Sync { url: url.to_string() };
                self.broadcast_locked(&state, &sync, None);
            }
            Err(e) => log::error!("Failed to encode image of room {}: {e}", self.name),
        }
        self.broadcast_locked(&state, &state.user_list(), None);
        self.broadcast_locked(&state, &state.palette_sync(), None);
    }

    /// Drop `user` from the room if its name still maps to this connection.
    ///
    /// Returns whether anything was removed.
    pub async fn remove_user(&self, user: &User) -> bool {
        let mut state = self.state.lock().await;
        let current = state.users.get(user.name()).map(|u| u.id());
        if current != Some(user.id()) {
            log::debug!(
                "Ignoring close of superseded connection {} for {:?}",
                user.id(),
                user.name()
            );
            return false;
        }
        state.users.shift_remove(user.name());
        log::info!("{:?} left room {} ({} users)", user.name(), self.name, state.users.len());
        self.broadcast_locked(&state, &state.user_list(), None);
        true
    }

    // ─── Packet handlers ──────────────────────────────────────────────

    pub async fn handle_operation(&self, operation: Operation, author: &str) {
        if !operation.within_limits(self.size) {
            log::warn!(
                "Dropping out-of-bounds {} from {author:?} in room {}",
                operation.kind(),
                self.name
            );
            AtomicRoomStats::bump(&self.stats.operations_rejected);
            return;
        }

        let mut state = self.state.lock().await;
        // The surface always equals a replay of the log, so applying the new
        // entry on top is the same as replaying from a cleared surface.
        if let Err(e) = state.surface.apply_operation(&operation) {
            log::warn!(
                "Dropping {} from {author:?} in room {}: {e}",
                operation.kind(),
                self.name
            );
            AtomicRoomStats::bump(&self.stats.operations_rejected);
            return;
        }
        log::debug!("{author:?} applied {} in room {}", operation.kind(), self.name);
        state.log.push(author, operation);
        AtomicRoomStats::bump(&self.stats.operations_applied);

        let url = match state.current_image() {
            Ok(url) => url.to_string(),
            Err(e) => {
                // Not reachable with the PNG codec. The surface stays dirty, so
                // the next successful encode syncs and persists this change too.
                log::error!("Failed to encode image of room {}: {e}", self.name);
                return;
            }
        };

        if state.log.needs_compaction() {
            state.log.compact(url.clone());
            AtomicRoomStats::bump(&self.stats.compactions);
            log::debug!("Compacted log of room {}", self.name);
        }

        self.broadcast_locked(&state, &ServerPacket::Sync { url }, None);
        self.persist(state.snapshot(self.size, &self.moderator_secret));
    }

    /// Promote or kick on behalf of `requester`.
    ///
    /// Ignored unless the password matches and the requester is a moderator.
    /// Moderators cannot target themselves.
    pub async fn handle_moderator(&self, password: &str, action: ModeratorAction, requester: &str) {
        let mut state = self.state.lock().await;
        if password != self.moderator_secret || !state.moderators.contains(requester) {
            log::debug!("Unauthorized moderator action from {requester:?} in room {}", self.name);
            return;
        }

        match action {
            ModeratorAction::Promote { username } => {
                if username == requester {
                    log::debug!("{requester:?} tried to promote themselves");
                    return;
                }
                state.moderators.insert(username.clone());
                if let Some(user) = state.users.get(&username) {
                    let promoted = ServerPacket::Promoted { password: self.moderator_secret.clone() };
                    match promoted.encode() {
                        Ok(text) => {
                            user.send_text(text.into());
                        }
                        Err(e) => log::error!("Failed to encode promoted packet: {e}"),
                    }
                }
                log::info!("{requester:?} promoted {username:?} in room {}", self.name);
                self.broadcast_locked(&state, &state.user_list(), None);
                self.persist(state.snapshot(self.size, &self.moderator_secret));
            }
            ModeratorAction::Kick { username } => {
                if username == requester {
                    log::debug!("{requester:?} tried to kick themselves");
                    return;
                }
                let Some(user) = state.users.get(&username) else {
                    log::debug!("{requester:?} kicked {username:?}, who is not connected");
                    return;
                };
                let notice = match ServerPacket::Kicked.encode() {
                    Ok(text) => Some(text.into()),
                    Err(e) => {
                        log::error!("Failed to encode kicked packet: {e}");
                        None
                    }
                };
                match user.kick(notice) {
                    Delivery::Queued => {}
                    Delivery::Overflowed => {
                        log::warn!("Queue of {username:?} is full, closing the kick out of band")
                    }
                    Delivery::Disconnected => {
                        log::debug!("{username:?} disconnected before the kick was delivered")
                    }
                }
                log::info!("{requester:?} kicked {username:?} from room {}", self.name);
            }
        }
    }

    /// Edit the shared palette. Open to every user.
    pub async fn handle_palette(&self, action: PaletteAction) {
        let mut state = self.state.lock().await;
        match action {
            PaletteAction::Add { color } => state.palette.push(color),
            PaletteAction::Remove { index } => {
                let len = state.palette.len();
                let Some(slot) = index
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .filter(|i| *i < len)
                else {
                    log::warn!(
                        "Ignoring removal of palette index {index} in room {} ({len} colours)",
                        self.name
                    );
                    return;
                };
                state.palette.remove(slot);
            }
        }
        self.broadcast_locked(&state, &state.palette_sync(), None);
        self.persist(state.snapshot(self.size, &self.moderator_secret));
    }

    /// Send `packet` to every user except `exclude`.
    pub async fn broadcast(&self, packet: &ServerPacket, exclude: Option<&str>) -> usize {
        let state = self.state.lock().await;
        self.broadcast_locked(&state, packet, exclude)
    }

    // ─── Inspection ───────────────────────────────────────────────────

    pub async fn user_names(&self) -> Vec<String> {
        self.state.lock().await.users.keys().cloned().collect()
    }

    pub async fn is_moderator(&self, name: &str) -> bool {
        self.state.lock().await.moderators.contains(name)
    }

    pub async fn moderators(&self) -> Vec<String> {
        self.state.lock().await.moderators.iter().cloned().collect()
    }

    pub async fn palette(&self) -> Vec<Color> {
        self.state.lock().await.palette.clone()
    }

    pub async fn log_len(&self) -> usize {
        self.state.lock().await.log.len()
    }

    /// Copy of the current RGBA8 pixels.
    pub async fn pixels(&self) -> Vec<u8> {
        self.state.lock().await.surface.data().to_vec()
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, CodecError> {
        self.state.lock().await.snapshot(self.size, &self.moderator_secret)
    }

    // ─── Internals ────────────────────────────────────────────────────

    fn broadcast_locked(&self, state: &RoomState, packet: &ServerPacket, exclude: Option<&str>) -> usize {
        let text: Arc<str> = match packet.encode() {
            Ok(text) => text.into(),
            Err(e) => {
                log::error!("Failed to encode broadcast for room {}: {e}", self.name);
                return 0;
            }
        };
        fan_out(state.users.values(), &text, exclude, &self.stats)
    }

    /// Upsert the snapshot. Failures are logged and counted, never returned.
    fn persist(&self, snapshot: Result<RoomSnapshot, CodecError>) {
        let result = match snapshot {
            Ok(snapshot) => self.store.save(&self.name, &snapshot).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            AtomicRoomStats::bump(&self.stats.persist_failures);
            log::error!("Failed to persist room {}: {e}", self.name);
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
