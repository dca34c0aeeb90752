use std::sync::Arc;

use yrs::encoding::read::Read;
use yrs::updates::decoder::Decode;

use super::{ensure_fits, AwarenessUpdate, AwarenessUpdateEntry, CheckedDecoder, ProtocolError};

/// State string a client sends when it leaves.
pub const NULL_STATE: &str = "null";

pub fn is_removal(entry: &AwarenessUpdateEntry) -> bool {
    &*entry.json == NULL_STATE
}

pub fn removal(clock: u32) -> AwarenessUpdateEntry {
    AwarenessUpdateEntry {
        clock,
        json: Arc::from(NULL_STATE),
    }
}

/// Decodes an awareness payload (the bytes after the frame tag's length
/// prefix). Every non-null state must be valid JSON.
pub fn decode_awareness(payload: &[u8]) -> Result<AwarenessUpdate, ProtocolError> {
    let declared: usize = CheckedDecoder::new(payload).read_var()?;
    // client id, clock and state length are at least one byte each
    ensure_fits(declared, payload.len(), 3)?;

    let mut decoder = CheckedDecoder::new(payload);
    let update = AwarenessUpdate::decode(&mut decoder).map_err(|e| match decoder.invalid_utf8() {
        Some(utf8) => ProtocolError::InvalidUtf8(utf8),
        None => ProtocolError::Malformed(e),
    })?;

    for (client_id, entry) in &update.clients {
        if !is_removal(entry) {
            serde_json::from_str::<serde_json::Value>(&entry.json)
                .map_err(|e| ProtocolError::InvalidAwarenessState(*client_id, e.to_string()))?;
        }
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yrs::encoding::write::Write;
    use yrs::updates::encoder::Encode;

    fn payload(client_id: u64, clock: u32, state: &[u8]) -> Vec<u8> {
        let mut bytes: Vec<u8> = Vec::new();
        bytes.write_var(1u32);
        bytes.write_var(client_id);
        bytes.write_var(clock);
        bytes.write_buf(state);
        bytes
    }

    #[test]
    fn decodes_state_and_removal_entries() {
        let mut update = AwarenessUpdate {
            clients: Default::default(),
        };
        update.clients.insert(
            9,
            AwarenessUpdateEntry {
                clock: 2,
                json: Arc::from(r#"{"user":{"name":"ada"}}"#),
            },
        );
        update.clients.insert(11, removal(4));

        let decoded = decode_awareness(&update.encode_v1()).unwrap();
        assert_eq!(decoded.clients[&9].clock, 2);
        assert!(!is_removal(&decoded.clients[&9]));
        assert!(is_removal(&decoded.clients[&11]));
    }

    #[test]
    fn rejects_non_json_state() {
        let err = decode_awareness(&payload(9, 1, b"{not json")).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidAwarenessState(9, _)));
    }

    #[test]
    fn rejects_state_that_is_not_utf8() {
        let err = decode_awareness(&payload(9, 1, b"\xff\xfe")).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8(_)));
    }

    #[test]
    fn refuses_entry_count_larger_than_payload() {
        let mut bytes: Vec<u8> = Vec::new();
        bytes.write_var(1_000_000u32);
        bytes.write_var(1u32);
        assert!(matches!(
            decode_awareness(&bytes),
            Err(ProtocolError::ImplausibleLength { declared: 1_000_000, .. })
        ));
    }

    #[test]
    fn truncated_entry_is_malformed() {
        let mut bytes = payload(9, 1, b"{}");
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(decode_awareness(&bytes), Err(ProtocolError::Malformed(_))));
    }
}
