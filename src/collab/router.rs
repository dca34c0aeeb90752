use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, trace};
use uuid::Uuid;
use yrs::block::ClientID;
use yrs::updates::encoder::Encode;

use super::awareness::PeerChange;
use super::document::DocumentError;
use super::room::RoomState;
use crate::protocol::{decode_frame, AwarenessUpdate, Message, ProtocolError, SyncMessage};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Outcome of routing one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// A response went back to the sender only.
    Replied,
    /// The document or awareness changed and `recipients` peers were told.
    Broadcast { recipients: usize },
    /// Valid, but nothing to relay (known update, stale awareness).
    Absorbed,
}

/// Session-side state the router needs besides the room.
pub struct Origin<'a> {
    pub session_id: Uuid,
    /// Awareness client ids this session has published.
    pub controlled: &'a mut HashSet<ClientID>,
}

/// Dispatches decoded frames against a locked room.
pub struct MessageRouter;

impl MessageRouter {
    pub fn route(room: &mut RoomState, origin: Origin<'_>, frame: &[u8]) -> Result<Routed, RouteError> {
        let message = decode_frame(frame)?;
        trace!("Routing {} from session {}", kind(&message), origin.session_id);
        match message {
            Message::Sync(sync) => Self::route_sync(room, origin.session_id, sync),
            Message::Awareness(update) => Self::route_awareness(room, origin, update, frame),
            // decode_frame refuses every other tag
            Message::Auth(_) | Message::AwarenessQuery | Message::Custom(..) => Ok(Routed::Absorbed),
        }
    }

    fn route_sync(room: &mut RoomState, session_id: Uuid, sync: SyncMessage) -> Result<Routed, RouteError> {
        match sync {
            SyncMessage::SyncStep1(remote_sv) => {
                let diff = room.doc.diff(&remote_sv);
                let reply = Message::Sync(SyncMessage::SyncStep2(diff)).encode_v1();
                room.send_to(&session_id, reply);
                Ok(Routed::Replied)
            }
            SyncMessage::SyncStep2(update) | SyncMessage::Update(update) => {
                match room.doc.apply_update(&update)? {
                    Some(delta) => {
                        let frame = Message::Sync(SyncMessage::Update(delta)).encode_v1();
                        let recipients = room.broadcast(&session_id, &frame);
                        Ok(Routed::Broadcast { recipients })
                    }
                    None => Ok(Routed::Absorbed),
                }
            }
        }
    }

    fn route_awareness(
        room: &mut RoomState,
        origin: Origin<'_>,
        update: AwarenessUpdate,
        frame: &[u8],
    ) -> Result<Routed, RouteError> {
        let applied = room.awareness.apply_update(&update);
        if applied.is_empty() {
            debug!(
                "Discarded {} stale awareness entries from session {}",
                applied.discarded, origin.session_id
            );
            return Ok(Routed::Absorbed);
        }

        for change in &applied.changes {
            match change {
                PeerChange::Added(id) | PeerChange::Updated(id) => {
                    origin.controlled.insert(*id);
                }
                PeerChange::Removed(id) => {
                    origin.controlled.remove(id);
                }
            }
        }

        // Relay exactly what the sender wrote unless part of it was stale.
        let relayed = if applied.discarded == 0 {
            frame.to_vec()
        } else {
            Message::Awareness(applied.accepted).encode_v1()
        };
        let recipients = room.broadcast(&origin.session_id, &relayed);
        Ok(Routed::Broadcast { recipients })
    }
}

fn kind(message: &Message) -> &'static str {
    match message {
        Message::Sync(SyncMessage::SyncStep1(_)) => "sync step1",
        Message::Sync(SyncMessage::SyncStep2(_)) => "sync step2",
        Message::Sync(SyncMessage::Update(_)) => "sync update",
        Message::Awareness(_) => "awareness",
        Message::Auth(_) => "auth",
        Message::AwarenessQuery => "awareness query",
        Message::Custom(..) => "custom",
    }
}
