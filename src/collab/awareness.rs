use std::collections::HashMap;
use std::sync::Arc;

use yrs::block::ClientID;

use crate::protocol::{is_removal, removal, AwarenessUpdate, AwarenessUpdateEntry};

#[derive(Debug, Clone)]
struct PeerState {
    clock: u32,
    /// `None` once retracted; the clock is kept to reject late replays.
    state: Option<Arc<str>>,
}

/// What happened to one entry of an incoming update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerChange {
    Added(ClientID),
    Updated(ClientID),
    Removed(ClientID),
}

/// Entries of an update that survived the clock check.
#[derive(Debug)]
pub struct AppliedAwareness {
    pub accepted: AwarenessUpdate,
    pub changes: Vec<PeerChange>,
    pub discarded: usize,
}

impl AppliedAwareness {
    pub fn is_empty(&self) -> bool {
        self.accepted.clients.is_empty()
    }
}

/// Ephemeral presence for one room: cursors, user names, colors.
#[derive(Debug, Default)]
pub struct AwarenessTracker {
    peers: HashMap<ClientID, PeerState>,
}

impl AwarenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies every entry whose clock is newer than the last one seen for
    /// that peer. Stale and duplicate entries are dropped silently.
    pub fn apply_update(&mut self, update: &AwarenessUpdate) -> AppliedAwareness {
        let mut applied = AppliedAwareness {
            accepted: AwarenessUpdate {
                clients: HashMap::new(),
            },
            changes: Vec::new(),
            discarded: 0,
        };
        for (&client_id, entry) in &update.clients {
            match self.apply_entry(client_id, entry) {
                Some(change) => {
                    applied.changes.push(change);
                    applied.accepted.clients.insert(client_id, entry.clone());
                }
                None => applied.discarded += 1,
            }
        }
        applied
    }

    fn apply_entry(&mut self, client_id: ClientID, entry: &AwarenessUpdateEntry) -> Option<PeerChange> {
        let previous = self.peers.get(&client_id);
        if let Some(prev) = previous {
            if entry.clock <= prev.clock {
                return None;
            }
        }
        let was_live = previous.map_or(false, |p| p.state.is_some());
        let state = (!is_removal(entry)).then(|| entry.json.clone());

        let change = match (&state, was_live) {
            (None, true) => PeerChange::Removed(client_id),
            (None, false) => {
                // Nothing to retract, but remember the clock.
                self.store(client_id, entry.clock, None);
                return None;
            }
            (Some(_), true) => PeerChange::Updated(client_id),
            (Some(_), false) => PeerChange::Added(client_id),
        };
        self.store(client_id, entry.clock, state);
        Some(change)
    }

    fn store(&mut self, client_id: ClientID, clock: u32, state: Option<Arc<str>>) {
        self.peers.insert(client_id, PeerState { clock, state });
    }

    /// Retracts a live peer and returns the entry announcing it.
    pub fn remove_peer(&mut self, client_id: ClientID) -> Option<AwarenessUpdateEntry> {
        let peer = self.peers.get_mut(&client_id)?;
        peer.state.take()?;
        peer.clock = peer.clock.wrapping_add(1);
        Some(removal(peer.clock))
    }

    /// All live peers, for replay to a newly joined session.
    pub fn snapshot(&self) -> Option<AwarenessUpdate> {
        let clients: HashMap<ClientID, AwarenessUpdateEntry> = self
            .peers
            .iter()
            .filter_map(|(id, peer)| {
                peer.state.as_ref().map(|state| {
                    let entry = AwarenessUpdateEntry {
                        clock: peer.clock,
                        json: state.clone(),
                    };
                    (*id, entry)
                })
            })
            .collect();
        if clients.is_empty() {
            return None;
        }
        Some(AwarenessUpdate { clients })
    }

    pub fn live_peers(&self) -> usize {
        self.peers.values().filter(|p| p.state.is_some()).count()
    }
}
