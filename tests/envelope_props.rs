use bytes::Bytes;
use extnode::{codec, DecodeError, Message, Payload};
use proptest::prelude::*;
use serde_json::json;

fn arb_payload() -> impl Strategy<Value = Payload> {
    let leaf = prop_oneof![
        Just(Payload::Null),
        any::<bool>().prop_map(Payload::from),
        any::<i64>().prop_map(Payload::from),
        any::<u64>().prop_map(Payload::from),
        // Дроби с точным двоичным представлением
        (-1_000_000i64..1_000_000).prop_map(|n| json!(n as f64 / 4.0)),
        ".*".prop_map(Payload::from),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Payload::from),
            prop::collection::btree_map(".*", inner, 0..8)
                .prop_map(|m| Payload::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_topic() -> impl Strategy<Value = String> {
    "[a-z_]{1,12}(/[a-z_0-9]{1,12}){0,4}"
}

proptest! {
    /// Свойство: decode(encode(m)) == m для любого корректного сообщения.
    #[test]
    fn prop_envelope_round_trip(topic in arb_topic(), payload in arb_payload()) {
        let message = Message::new(topic, payload);
        let frames = codec::encode(&message);
        prop_assert_eq!(frames.len(), 2);
        prop_assert_eq!(codec::decode(&frames).unwrap(), message);
    }

    /// Свойство: произвольные байты в кадре payload либо декодируются, либо
    /// дают InvalidPayload, но не паникуют.
    #[test]
    fn prop_decode_never_panics(body in prop::collection::vec(any::<u8>(), 0..256)) {
        let frames = vec![Bytes::from_static(b"t"), Bytes::from(body)];
        match codec::decode(&frames) {
            Ok(msg) => prop_assert_eq!(msg.topic, "t"),
            Err(e) => prop_assert!(matches!(e, DecodeError::InvalidPayload { .. }), "expected InvalidPayload"),
        }
    }
}
