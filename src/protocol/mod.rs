//! Binary framing spoken by y-websocket compatible clients.
//!
//! Frame and awareness types are the ones `yrs::sync` ships. Inbound
//! bytes are only ever decoded through [`CheckedDecoder`], never through
//! the stock yrs decoders, and length prefixes that would make yrs reserve
//! absurd amounts of memory are refused up front.

pub mod awareness;
pub mod decoder;
pub mod frame;

pub use awareness::{decode_awareness, is_removal, removal, NULL_STATE};
pub use decoder::CheckedDecoder;
pub use frame::decode_frame;
pub use yrs::sync::awareness::AwarenessUpdateEntry;
pub use yrs::sync::{AwarenessUpdate, Message, SyncMessage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported message tag {0}")]
    UnknownMessageTag(u8),
    #[error("malformed payload: {0}")]
    Malformed(#[from] yrs::encoding::read::Error),
    #[error("string is not valid UTF-8: {0}")]
    InvalidUtf8(std::str::Utf8Error),
    #[error("awareness state for client {0} is not valid JSON: {1}")]
    InvalidAwarenessState(u64, String),
    #[error("payload declares {declared} entries but carries only {available} bytes")]
    ImplausibleLength { declared: usize, available: usize },
}

/// Refuses a count that could not possibly fit in the remaining bytes.
pub(crate) fn ensure_fits(declared: usize, available: usize, min_entry_len: usize) -> Result<(), ProtocolError> {
    if declared > available / min_entry_len {
        return Err(ProtocolError::ImplausibleLength { declared, available });
    }
    Ok(())
}
