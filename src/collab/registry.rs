use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use super::room::{Room, RoomId};

/// What happens to a room once its last session leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Drop the document and awareness state when no session is left.
    #[default]
    OnIdle,
    /// Keep every room for the lifetime of the process.
    Never,
}

struct RoomEntry {
    room: Arc<Room>,
    sessions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub rooms: usize,
    pub sessions: usize,
    pub awareness_peers: usize,
}

/// Process-wide map from room id to its live [`Room`].
///
/// Built once at startup and handed to the upgrade path through the
/// router state.
pub struct DocumentRegistry {
    rooms: RwLock<HashMap<RoomId, RoomEntry>>,
    policy: EvictionPolicy,
}

impl DocumentRegistry {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Returns the room for `room_id`, creating it on first use. Racing
    /// callers all observe the instance inserted first.
    pub async fn get_or_create(&self, room_id: &RoomId) -> Arc<Room> {
        if let Some(entry) = self.rooms.read().await.get(room_id) {
            return entry.room.clone();
        }
        let mut rooms = self.rooms.write().await;
        Self::entry(&mut rooms, room_id).room.clone()
    }

    /// Like [`get_or_create`](Self::get_or_create) but also counts the
    /// caller as a session holding the room open.
    pub async fn acquire(&self, room_id: &RoomId) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;
        let entry = Self::entry(&mut rooms, room_id);
        entry.sessions += 1;
        entry.room.clone()
    }

    /// Drops one session reference. Returns `true` if the room was evicted.
    pub async fn release(&self, room_id: &RoomId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(room_id) else {
            return false;
        };
        entry.sessions = entry.sessions.saturating_sub(1);
        if entry.sessions > 0 || self.policy == EvictionPolicy::Never {
            return false;
        }
        rooms.remove(room_id);
        info!("Evicted idle room {}", room_id);
        true
    }

    fn entry<'a>(rooms: &'a mut HashMap<RoomId, RoomEntry>, room_id: &RoomId) -> &'a mut RoomEntry {
        rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Created room {}", room_id);
            RoomEntry {
                room: Arc::new(Room::new(room_id.clone())),
                sessions: 0,
            }
        })
    }

    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        let rooms: Vec<Arc<Room>> = {
            let map = self.rooms.read().await;
            map.values().map(|e| e.room.clone()).collect()
        };
        let mut stats = RegistryStats {
            rooms: rooms.len(),
            ..RegistryStats::default()
        };
        for room in rooms {
            let state = room.lock().await;
            stats.sessions += state.session_count();
            stats.awareness_peers += state.awareness.live_peers();
        }
        stats
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new(EvictionPolicy::default())
    }
}
