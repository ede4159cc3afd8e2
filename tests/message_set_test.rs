//! Message-set decoding semantics: round trips, truncation tolerance,
//! the undersized-buffer distinction and checksum sensitivity.

use kafwire::checksum;
use kafwire::{
    decode_message, encode_message, encode_message_set, encode_message_set_with_offsets,
    KafwireError, Message, MessageSet, OffsetAndMessage,
};

fn set_of(entries: &[(i64, Message)]) -> MessageSet {
    MessageSet::from_vec(encode_message_set_with_offsets(entries).unwrap())
}

#[test]
fn message_round_trips_at_any_offset() {
    let message = Message::new(b"test".to_vec()).with_key(b"key".to_vec());
    let encoded = encode_message(&message).unwrap();
    for offset in [0, 10, i64::MAX] {
        let decoded = decode_message(&encoded, offset).unwrap();
        assert_eq!(decoded, vec![OffsetAndMessage::new(offset, message.clone())]);
    }
}

#[test]
fn empty_key_survives_round_trip() {
    let message = Message::new(b"v".to_vec()).with_key(Vec::new());
    let encoded = encode_message(&message).unwrap();
    let decoded = decode_message(&encoded, 0).unwrap();
    assert_eq!(decoded[0].message.key, Some(Vec::new()));
}

#[test]
fn message_set_round_trips_with_broker_assigned_offsets() {
    let entries: Vec<(i64, Message)> = (0..4)
        .map(|i| {
            (
                i as i64,
                Message::new(format!("v{}", i).into_bytes()).with_key(format!("k{}", i).into_bytes()),
            )
        })
        .collect();
    let set = set_of(&entries);
    let decoded: Vec<OffsetAndMessage> = set.iter().map(|e| e.unwrap()).collect();
    assert_eq!(decoded.len(), 4);
    for (i, entry) in decoded.iter().enumerate() {
        assert_eq!(entry.offset, i as i64);
        assert_eq!(entry.message, entries[i].1);
    }
}

#[test]
fn client_encoded_sets_carry_placeholder_offsets() {
    let messages = vec![Message::new(b"a".to_vec()), Message::new(b"b".to_vec())];
    let set = MessageSet::from_vec(encode_message_set(&messages).unwrap());
    let decoded: Vec<OffsetAndMessage> = set.iter().map(|e| e.unwrap()).collect();
    assert!(decoded.iter().all(|e| e.offset == 0));
    assert_eq!(decoded[0].message.value, b"a");
    assert_eq!(decoded[1].message.value, b"b");
}

#[test]
fn partial_trailing_frame_stops_iteration_without_error() {
    let entries = vec![
        (0, Message::new(b"v1".to_vec()).with_key(b"k1".to_vec())),
        (1, Message::new(b"v2".to_vec()).with_key(b"k2".to_vec())),
    ];
    let mut data = encode_message_set_with_offsets(&entries).unwrap();
    data.extend_from_slice(b"@1$%(Y!"); // random padding, shorter than a header
    let set = MessageSet::from_vec(data);
    let decoded: Vec<OffsetAndMessage> = set.iter().map(|e| e.unwrap()).collect();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].offset, 0);
    assert_eq!(decoded[1].offset, 1);
}

#[test]
fn truncated_final_message_is_not_an_error() {
    let entries = vec![
        (5, Message::new(b"whole".to_vec())),
        (6, Message::new(b"also whole".to_vec())),
    ];
    let mut data = encode_message_set_with_offsets(&entries).unwrap();
    // A third frame whose declared size exceeds what the transport returned.
    data.extend_from_slice(&7i64.to_be_bytes());
    data.extend_from_slice(&100i32.to_be_bytes());
    data.extend_from_slice(&[1, 2, 3, 4, 5]);
    let set = MessageSet::from_vec(data);
    let decoded: Vec<OffsetAndMessage> = set.iter().map(|e| e.unwrap()).collect();
    assert_eq!(decoded.len(), 2);
}

#[test]
fn undersized_buffer_raises_fetch_size_too_small() {
    let set = MessageSet::from_vec(b"a".to_vec());
    let mut iter = set.iter();
    assert!(matches!(
        iter.next(),
        Some(Err(KafwireError::FetchSizeTooSmall))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn buffer_holding_only_a_truncated_first_frame_raises_fetch_size_too_small() {
    let data = encode_message_set(&[Message::new(b"too big for the budget".to_vec())]).unwrap();
    let set = MessageSet::from_vec(data[..13].to_vec());
    assert!(matches!(
        set.iter().next(),
        Some(Err(KafwireError::FetchSizeTooSmall))
    ));
}

#[test]
fn empty_buffer_yields_nothing() {
    let set = MessageSet::from_vec(Vec::new());
    assert_eq!(set.iter().count(), 0);
}

#[test]
fn every_corrupted_byte_fails_the_checksum() {
    let message = Message::new(b"payload".to_vec()).with_key(b"key".to_vec());
    let encoded = encode_message(&message).unwrap();
    for i in 0..encoded.len() {
        let mut corrupted = encoded.clone();
        corrupted[i] ^= 0xFF;
        let err = decode_message(&corrupted, 0).unwrap_err();
        assert!(
            matches!(err, KafwireError::Checksum { .. }),
            "byte {} gave {:?}",
            i,
            err
        );
    }
}

#[test]
fn checksum_failure_is_not_swallowed_by_set_iteration() {
    let entries = vec![
        (0, Message::new(b"good".to_vec())),
        (1, Message::new(b"bad".to_vec())),
    ];
    let mut data = encode_message_set_with_offsets(&entries).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF; // corrupt the second message's value
    let set = MessageSet::from_vec(data);
    let mut iter = set.iter();
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(
        iter.next(),
        Some(Err(KafwireError::Checksum { .. }))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn negative_message_size_is_a_protocol_error() {
    let mut data = Vec::new();
    data.extend_from_slice(&0i64.to_be_bytes());
    data.extend_from_slice(&(-5i32).to_be_bytes());
    data.extend_from_slice(&[0u8; 16]);
    let set = MessageSet::from_vec(data);
    assert!(matches!(
        set.iter().next(),
        Some(Err(KafwireError::Protocol(_)))
    ));
}

#[test]
fn key_length_below_null_sentinel_is_a_protocol_error() {
    // Hand-built frame: valid checksum over a body whose key length is -2.
    let mut body = vec![0x00, 0x00]; // magic, attributes
    body.extend_from_slice(&(-2i32).to_be_bytes());
    body.extend_from_slice(&0i32.to_be_bytes());
    let mut frame = checksum::crc32(&body).to_be_bytes().to_vec();
    frame.extend_from_slice(&body);
    assert!(matches!(
        decode_message(&frame, 0),
        Err(KafwireError::Protocol(_))
    ));
}

#[test]
fn null_value_is_a_protocol_error() {
    let mut body = vec![0x00, 0x00];
    body.extend_from_slice(&(-1i32).to_be_bytes()); // null key is fine
    body.extend_from_slice(&(-1i32).to_be_bytes()); // null value is not
    let mut frame = checksum::crc32(&body).to_be_bytes().to_vec();
    frame.extend_from_slice(&body);
    assert!(matches!(
        decode_message(&frame, 0),
        Err(KafwireError::Protocol(_))
    ));
}

#[test]
fn encoding_rejects_unsupported_magic() {
    let message = Message {
        magic: 1,
        attributes: 0,
        key: Some(b"key".to_vec()),
        value: b"test".to_vec(),
    };
    assert!(matches!(
        encode_message(&message),
        Err(KafwireError::Protocol(_))
    ));
}

#[test]
fn encoding_rejects_reserved_attribute_bits() {
    let message = Message {
        magic: 0,
        attributes: 0x10,
        key: None,
        value: b"v".to_vec(),
    };
    assert!(matches!(
        encode_message(&message),
        Err(KafwireError::Protocol(_))
    ));
}

#[test]
fn unknown_codec_bits_fail_loudly_on_decode() {
    let mut body = vec![0x00, 0x03]; // magic, attributes naming codec 3
    body.extend_from_slice(&(-1i32).to_be_bytes());
    body.extend_from_slice(&1i32.to_be_bytes());
    body.push(b'x');
    let mut frame = checksum::crc32(&body).to_be_bytes().to_vec();
    frame.extend_from_slice(&body);
    assert!(matches!(
        decode_message(&frame, 0),
        Err(KafwireError::UnsupportedCodec(0x03))
    ));
}

#[test]
fn iteration_restarts_from_the_buffer_start() {
    let entries = vec![(3, Message::new(b"v".to_vec()))];
    let set = set_of(&entries);
    for _ in 0..2 {
        let decoded: Vec<OffsetAndMessage> = set.iter().map(|e| e.unwrap()).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].offset, 3);
    }
}
