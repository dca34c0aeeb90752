use yrs::encoding::read::Read;
use yrs::sync::protocol::{MSG_AWARENESS, MSG_SYNC, MSG_SYNC_STEP_1};
use yrs::updates::decoder::Decode;

use super::awareness::decode_awareness;
use super::{ensure_fits, CheckedDecoder, Message, ProtocolError, SyncMessage};

/// Decodes one inbound frame. Only sync and awareness frames are part of
/// the relay protocol; auth, awareness queries and custom tags are refused.
pub fn decode_frame(frame: &[u8]) -> Result<Message, ProtocolError> {
    let mut decoder = CheckedDecoder::new(frame);
    let tag: u8 = decoder.read_var()?;
    match tag {
        MSG_SYNC => {
            check_state_vector_len(decoder.clone())?;
            Ok(Message::Sync(SyncMessage::decode(&mut decoder)?))
        }
        MSG_AWARENESS => {
            let payload = decoder.read_buf()?;
            Ok(Message::Awareness(decode_awareness(payload)?))
        }
        other => Err(ProtocolError::UnknownMessageTag(other)),
    }
}

/// yrs sizes its state vector map from the declared entry count.
fn check_state_vector_len(mut peek: CheckedDecoder<'_>) -> Result<(), ProtocolError> {
    let kind: u8 = peek.read_var()?;
    if kind != MSG_SYNC_STEP_1 {
        return Ok(());
    }
    let mut sv = CheckedDecoder::new(peek.read_buf()?);
    let declared: u32 = sv.read_var()?;
    // client id and clock are at least one byte each
    ensure_fits(declared as usize, sv.remaining(), 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yrs::updates::encoder::Encode;
    use yrs::StateVector;

    #[test]
    fn update_frame_has_y_protocols_layout() {
        let frame = Message::Sync(SyncMessage::Update(vec![0, 0])).encode_v1();
        // tag, sync kind, payload length, payload
        assert_eq!(frame, vec![0, 2, 2, 0, 0]);
        assert_eq!(
            decode_frame(&frame).unwrap(),
            Message::Sync(SyncMessage::Update(vec![0, 0]))
        );
    }

    #[test]
    fn decodes_state_vector_request() {
        let frame = Message::Sync(SyncMessage::SyncStep1(StateVector::default())).encode_v1();
        assert_eq!(
            decode_frame(&frame).unwrap(),
            Message::Sync(SyncMessage::SyncStep1(StateVector::default()))
        );
    }

    #[test]
    fn refuses_tags_outside_the_relay_protocol() {
        assert!(matches!(decode_frame(&[3]), Err(ProtocolError::UnknownMessageTag(3))));
        assert!(matches!(decode_frame(&[7, 0]), Err(ProtocolError::UnknownMessageTag(7))));
    }

    #[test]
    fn rejects_unknown_sync_kind_and_truncation() {
        assert!(matches!(decode_frame(&[0, 9, 0]), Err(ProtocolError::Malformed(_))));
        // declares 5 payload bytes but carries 1
        assert!(matches!(decode_frame(&[0, 2, 5, 1]), Err(ProtocolError::Malformed(_))));
        assert!(decode_frame(&[]).is_err());
    }

    #[test]
    fn refuses_state_vector_with_absurd_entry_count() {
        // step1 whose state vector claims u32::MAX clients
        let frame = [0, 0, 5, 0xff, 0xff, 0xff, 0xff, 0x0f];
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::ImplausibleLength { declared, .. }) if declared == u32::MAX as usize
        ));
    }
}
