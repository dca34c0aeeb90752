//! Real-time relay between editors of the same note.
//!
//! A socket under the collaboration prefix becomes a [`Session`] bound to
//! one [`Room`]. The room owns the shared CRDT document, the awareness
//! tracker and the outbound queues of every session in it; the
//! [`MessageRouter`] applies inbound frames against it and fans changes
//! out to the other sessions.

pub mod awareness;
pub mod document;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod session;

pub use awareness::AwarenessTracker;
pub use document::SharedDocument;
pub use registry::{DocumentRegistry, EvictionPolicy, RegistryStats};
pub use room::{Room, RoomId};
pub use router::{MessageRouter, Routed};
pub use session::{Session, SessionError, SessionState};
