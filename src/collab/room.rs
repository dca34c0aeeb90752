use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

use super::awareness::AwarenessTracker;
use super::document::SharedDocument;
use super::session::SessionError;

/// Queue feeding one socket's writer task.
pub type Outbound = mpsc::Sender<Vec<u8>>;

/// Frames a session may have queued before it is cut loose. A reader that
/// falls this far behind is detached from the room; dropping its sender
/// lets the writer drain what is queued and then close the socket.
pub const OUTBOUND_QUEUE_FRAMES: usize = 1024;

/// Key of a collaborative room, taken from the connection path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let trimmed = raw.split('?').next().unwrap_or_default().trim_matches('/');
        if trimmed.is_empty() {
            return Err(SessionError::MissingRoom);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One note's live editing state and the sessions bound to it.
pub struct Room {
    id: RoomId,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            state: Mutex::new(RoomState::default()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Exclusive access to the document, awareness and session list.
    ///
    /// Every mutation and its broadcast happen under this lock, which is
    /// what keeps per-room delivery order equal to apply order.
    pub async fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }
}

#[derive(Default)]
pub struct RoomState {
    pub doc: SharedDocument,
    pub awareness: AwarenessTracker,
    sessions: HashMap<Uuid, Outbound>,
}

impl RoomState {
    pub(crate) fn insert_session(&mut self, id: Uuid, outbound: Outbound) {
        self.sessions.insert(id, outbound);
    }

    pub(crate) fn remove_session(&mut self, id: &Uuid) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Queues `frame` for one session only.
    pub fn send_to(&mut self, id: &Uuid, frame: Vec<u8>) -> bool {
        let Some(tx) = self.sessions.get(id) else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                self.detach(id, e);
                false
            }
        }
    }

    /// Queues `frame` for every session except `origin`. Returns how many
    /// queues accepted it.
    pub fn broadcast(&mut self, origin: &Uuid, frame: &[u8]) -> usize {
        let mut delivered = 0;
        let mut lagging = Vec::new();
        for (id, tx) in self.sessions.iter().filter(|(id, _)| *id != origin) {
            match tx.try_send(frame.to_vec()) {
                Ok(()) => delivered += 1,
                Err(e) => lagging.push((*id, e)),
            }
        }
        for (id, e) in lagging {
            self.detach(&id, e);
        }
        delivered
    }

    fn detach(&mut self, id: &Uuid, reason: TrySendError<Vec<u8>>) {
        self.sessions.remove(id);
        match reason {
            TrySendError::Full(_) => warn!("Session {} fell {} frames behind, detaching", id, OUTBOUND_QUEUE_FRAMES),
            TrySendError::Closed(_) => warn!("Session {} is gone, detaching", id),
        }
    }
}
