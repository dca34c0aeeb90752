use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use yrs::block::ClientID;
use yrs::updates::encoder::Encode;

use super::registry::DocumentRegistry;
use super::room::{Outbound, Room, RoomId};
use super::router::{MessageRouter, Origin, RouteError, Routed};
use crate::protocol::{AwarenessUpdate, Message, SyncMessage};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection path does not name a room")]
    MissingRoom,
    #[error("session {0} cannot start from state {1:?}")]
    InvalidTransition(Uuid, SessionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Syncing,
    Active,
    Closed,
}

/// One socket bound to one room for its whole life.
///
/// A session that is dropped without [`close`](Session::close) (a panic in
/// the socket task, a cancelled future) still deregisters, retracts its
/// awareness peers and releases the room, from a task spawned on drop.
pub struct Session {
    id: Uuid,
    room_id: RoomId,
    room: Arc<Room>,
    registry: Arc<DocumentRegistry>,
    state: SessionState,
    controlled: HashSet<ClientID>,
    user: Option<String>,
}

impl Session {
    /// Resolves the room and takes a reference on it. The session is
    /// `Connecting` until [`start`](Self::start) runs.
    pub async fn connect(registry: Arc<DocumentRegistry>, raw_room: &str, user: Option<String>) -> Result<Self, SessionError> {
        let room_id = RoomId::parse(raw_room)?;
        let room = registry.acquire(&room_id).await;
        let id = Uuid::new_v4();
        info!(
            "Session {} connecting to room {} (user: {})",
            id,
            room_id,
            user.as_deref().unwrap_or("anonymous")
        );
        Ok(Self {
            id,
            room_id,
            room,
            registry,
            state: SessionState::Connecting,
            controlled: HashSet::new(),
            user,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Registers the outbound queue and pushes the initial sync: the full
    /// document, our state vector so the client sends back what we lack,
    /// then the awareness snapshot when anyone is present.
    ///
    /// Registration and the initial sends share one critical section, so
    /// no update can slip in between the snapshot and the first broadcast
    /// this session receives.
    pub async fn start(&mut self, outbound: Outbound) -> Result<(), SessionError> {
        if self.state != SessionState::Connecting {
            return Err(SessionError::InvalidTransition(self.id, self.state));
        }
        self.state = SessionState::Syncing;

        let mut room = self.room.lock().await;
        room.insert_session(self.id, outbound);

        let full_state = Message::Sync(SyncMessage::SyncStep2(room.doc.full_state())).encode_v1();
        let state_vector = Message::Sync(SyncMessage::SyncStep1(room.doc.state_vector())).encode_v1();
        room.send_to(&self.id, full_state);
        room.send_to(&self.id, state_vector);
        if let Some(snapshot) = room.awareness.snapshot() {
            room.send_to(&self.id, Message::Awareness(snapshot).encode_v1());
        }
        let peers = room.session_count();
        drop(room);

        self.state = SessionState::Active;
        info!("Session {} active in room {} ({} sessions)", self.id, self.room_id, peers);
        Ok(())
    }

    /// Routes one inbound binary frame. Bad frames are logged and dropped;
    /// they never end the session.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Option<Routed> {
        if self.state == SessionState::Closed {
            debug!("Ignoring frame for closed session {}", self.id);
            return None;
        }
        let mut room = self.room.lock().await;
        let origin = Origin {
            session_id: self.id,
            controlled: &mut self.controlled,
        };
        match MessageRouter::route(&mut room, origin, frame) {
            Ok(routed) => Some(routed),
            Err(RouteError::Protocol(e)) => {
                warn!("Dropping malformed frame from session {} in room {}: {}", self.id, self.room_id, e);
                None
            }
            Err(RouteError::Document(e)) => {
                warn!("Dropping sync frame from session {} in room {}: {}", self.id, self.room_id, e);
                None
            }
        }
    }

    /// Tears the session down. Only the first call has any effect: it
    /// deregisters, retracts this session's awareness peers, tells the
    /// rest of the room, and releases the room reference.
    pub async fn close(&mut self) -> bool {
        match self.take_teardown() {
            Some(teardown) => {
                teardown.run().await;
                true
            }
            None => false,
        }
    }

    fn take_teardown(&mut self) -> Option<Teardown> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.state = SessionState::Closed;
        Some(Teardown {
            id: self.id,
            room_id: self.room_id.clone(),
            room: self.room.clone(),
            registry: self.registry.clone(),
            controlled: std::mem::take(&mut self.controlled),
            user: self.user.take(),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(teardown) = self.take_teardown() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Session {} dropped without closing, cleaning up", teardown.id);
                handle.spawn(teardown.run());
            }
            Err(_) => error!(
                "Session {} dropped outside the runtime, room {} keeps its reference",
                teardown.id, teardown.room_id
            ),
        }
    }
}

/// Everything needed to leave a room, detached from the session so it can
/// also run from `Drop`.
struct Teardown {
    id: Uuid,
    room_id: RoomId,
    room: Arc<Room>,
    registry: Arc<DocumentRegistry>,
    controlled: HashSet<ClientID>,
    user: Option<String>,
}

impl Teardown {
    async fn run(self) {
        {
            let mut room = self.room.lock().await;
            room.remove_session(&self.id);

            let clients: HashMap<_, _> = self
                .controlled
                .iter()
                .filter_map(|id| room.awareness.remove_peer(*id).map(|entry| (*id, entry)))
                .collect();
            if !clients.is_empty() {
                let frame = Message::Awareness(AwarenessUpdate { clients }).encode_v1();
                let recipients = room.broadcast(&self.id, &frame);
                debug!("Retracted awareness of session {} to {} peers", self.id, recipients);
            }
        }

        let evicted = self.registry.release(&self.room_id).await;
        info!(
            "Session {} closed in room {} (user: {}){}",
            self.id,
            self.room_id,
            self.user.as_deref().unwrap_or("anonymous"),
            if evicted { ", room evicted" } else { "" }
        );
    }
}
