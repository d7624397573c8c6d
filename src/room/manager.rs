//! Process-wide registry of live rooms

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use super::{Room, RoomConfig, RoomHandle};

/// Outcome of a room lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLookup {
    Found(Uuid),
    NotFound,
}

/// Registry of all active rooms.
///
/// Rooms are only added by `create` and only removed by `destroy`, which a
/// room's own task calls once its idle teardown fires.
pub struct RoomManager {
    rooms: DashMap<Uuid, RoomHandle>,
    next_seq: AtomicU64,
    config: RoomConfig,
}

impl RoomManager {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            next_seq: AtomicU64::new(0),
            config,
        }
    }

    /// Create a room, start its task and return its id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(self: &Arc<Self>, name: &str, passcode: &str) -> Uuid {
        let room_id = Uuid::new_v4();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let seed = rand::random::<u64>();

        let (room, handle, input_rx) = Room::new(
            room_id,
            name.to_string(),
            passcode.to_string(),
            seq,
            seed,
            self.config.clone(),
        );
        self.rooms.insert(room_id, handle);

        info!(
            room_id = %room_id,
            name = %name,
            active_rooms = self.rooms.len(),
            "Created new room"
        );

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            room.run(input_rx).await;
            manager.destroy(&room_id);
        });

        room_id
    }

    /// First room (in creation order) whose name and passcode both match exactly
    pub fn find_by_name_and_passcode(&self, name: &str, passcode: &str) -> RoomLookup {
        self.rooms
            .iter()
            .filter(|entry| entry.name == name && entry.passcode == passcode)
            .min_by_key(|entry| entry.seq)
            .map_or(RoomLookup::NotFound, |entry| RoomLookup::Found(entry.id))
    }

    /// Confirm a room still exists (used by reconnecting clients)
    pub fn find_by_id(&self, room_id: &Uuid) -> RoomLookup {
        if self.rooms.contains_key(room_id) {
            RoomLookup::Found(*room_id)
        } else {
            RoomLookup::NotFound
        }
    }

    pub fn get(&self, room_id: &Uuid) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    /// Remove a room. No-op if it is already gone.
    pub fn destroy(&self, room_id: &Uuid) {
        if self.rooms.remove(room_id).is_some() {
            info!(
                room_id = %room_id,
                active_rooms = self.rooms.len(),
                "Room removed from registry"
            );
        }
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}
