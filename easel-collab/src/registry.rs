//! Name → room lookup shared by the WebSocket server and the HTTP handlers.

use std::collections::HashMap;
use std::sync::Arc;

use easel_raster::{CodecError, ImageCodec, Size};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::room::{Room, RoomConfig};
use crate::storage::{RoomStore, StoreError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("room {0:?} already exists")]
    Conflict(String),
    #[error("room name must not be empty")]
    InvalidName,
    #[error("creator name must not be empty")]
    InvalidCreator,
    #[error("canvas size {width}x{height} must be between 1x1 and {max}x{max}")]
    InvalidSize { width: u32, height: u32, max: u32 },
    #[error("failed to encode initial image: {0}")]
    Codec(#[from] CodecError),
}

/// Returned to whoever created a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub moderator_secret: String,
}

impl RoomInfo {
    fn of(room: &Room) -> Self {
        Self {
            room_id: room.name().to_string(),
            moderator_secret: room.moderator_secret().to_string(),
        }
    }
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    store: Arc<dyn RoomStore>,
    codec: Arc<dyn ImageCodec>,
    config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn RoomStore>, codec: Arc<dyn ImageCodec>, config: RoomConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
            codec,
            config,
        }
    }

    /// Create an empty room. An existing room with the same name is left untouched.
    pub async fn create_room(
        &self,
        name: &str,
        size: Size,
        creator: &str,
    ) -> Result<RoomInfo, RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidName);
        }
        if creator.trim().is_empty() {
            return Err(RegistryError::InvalidCreator);
        }
        let max = self.config.max_canvas_dimension;
        if size.width == 0 || size.height == 0 || size.width > max || size.height > max {
            return Err(RegistryError::InvalidSize { width: size.width, height: size.height, max });
        }

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(name) {
            return Err(RegistryError::Conflict(name.to_string()));
        }
        let room = Room::create(
            name,
            size,
            creator,
            &self.config,
            self.codec.clone(),
            self.store.clone(),
        )?;
        let info = RoomInfo::of(&room);
        rooms.insert(name.to_string(), Arc::new(room));
        log::info!(
            "Created room {name:?} ({}x{}) for {creator:?}",
            size.width,
            size.height
        );
        Ok(info)
    }

    pub async fn get_room(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(name).cloned()
    }

    /// Rebuild every persisted room. Records that fail to load are skipped.
    ///
    /// Returns the number of rooms restored.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let names = self.store.list()?;
        let mut rooms = self.rooms.write().await;
        let mut restored = 0;

        for name in &names {
            if rooms.contains_key(name) {
                continue;
            }
            let snapshot = match self.store.load(name) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Skipping stored room {name:?}: {e}");
                    continue;
                }
            };
            match Room::restore(
                name.as_str(),
                snapshot,
                &self.config,
                self.codec.clone(),
                self.store.clone(),
            ) {
                Ok(room) => {
                    rooms.insert(name.clone(), Arc::new(room));
                    restored += 1;
                    log::info!("Restored room {name:?} from storage");
                }
                Err(e) => log::warn!("Skipping stored room {name:?}: {e}"),
            }
        }

        log::info!("Restore complete: {restored}/{} rooms", names.len());
        Ok(restored)
    }

    /// Sorted names of all live rooms.
    pub async fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
