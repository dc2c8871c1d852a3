//! Process-local store used when no storage path is configured.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{RoomSnapshot, RoomStore, StoreError};

/// Keeps serialised snapshots in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoomStore for MemoryRoomStore {
    fn save(&self, room: &str, snapshot: &RoomSnapshot) -> Result<(), StoreError> {
        let bytes = snapshot.to_json()?;
        self.records().insert(room.to_string(), bytes);
        Ok(())
    }

    fn load(&self, room: &str) -> Result<Option<RoomSnapshot>, StoreError> {
        match self.records().get(room) {
            Some(bytes) => RoomSnapshot::from_json(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records().keys().cloned().collect())
    }
}
