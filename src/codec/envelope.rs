use bytes::Bytes;
use extnode_error::DecodeError;

use crate::{Message, Payload};

/// Логические кадры одного сообщения на проводе.
pub type Multipart = Vec<Bytes>;

/// Кодирует сообщение в два кадра: топик (UTF-8) и payload (JSON-текст).
///
/// Чистая функция; `Display` у `serde_json::Value` всегда выдаёт корректный
/// компактный JSON.
pub fn encode(message: &Message) -> Multipart {
    vec![
        Bytes::copy_from_slice(message.topic.as_bytes()),
        Bytes::from(message.payload.to_string()),
    ]
}

/// Декодирует два кадра обратно в сообщение.
///
/// Кадры сверх второго игнорируются. Форма payload не проверяется: любой
/// корректный JSON принимается, валидация остаётся за обработчиком.
pub fn decode(frames: &[Bytes]) -> Result<Message, DecodeError> {
    let [topic, payload, ..] = frames else {
        return Err(DecodeError::MalformedFrame {
            reason: format!("expected 2 frames, got {}", frames.len()),
        });
    };

    let topic = std::str::from_utf8(topic).map_err(|e| DecodeError::MalformedFrame {
        reason: format!("topic is not valid UTF-8: {e}"),
    })?;
    if topic.is_empty() {
        return Err(DecodeError::MalformedFrame {
            reason: "topic frame is empty".to_string(),
        });
    }

    let payload: Payload =
        serde_json::from_slice(payload).map_err(|e| DecodeError::InvalidPayload {
            reason: e.to_string(),
        })?;

    Ok(Message::new(topic, payload))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Тест проверяет формат кадров на проводе.
    #[test]
    fn test_encode_wire_layout() {
        let msg = Message::new(
            "adapter_core/exts/operate",
            json!({"content": "start"}),
        );
        let frames = encode(&msg);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"adapter_core/exts/operate");
        assert_eq!(&frames[1][..], br#"{"content":"start"}"#);
    }

    /// Тест проверяет декодирование сообщения с вложенной структурой.
    #[test]
    fn test_decode_nested_payload() {
        let frames = vec![
            Bytes::from_static(b"from_scratch/extensions"),
            Bytes::from_static(br#"{"extension_id":"eim","content":{"n":[1,2.5,null,true]}}"#),
        ];
        let msg = decode(&frames).unwrap();

        assert_eq!(msg.topic, "from_scratch/extensions");
        assert_eq!(msg.payload["content"]["n"][1], json!(2.5));
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    /// Тест проверяет, что один кадр даёт MalformedFrame.
    #[test]
    fn test_decode_single_frame() {
        let err = decode(&[Bytes::from_static(b"topic")]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedFrame { .. }));
        assert!(err.to_string().contains("got 1"));

        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedFrame { .. }));
    }

    /// Тест проверяет, что невалидный JSON даёт InvalidPayload.
    #[test]
    fn test_decode_invalid_json() {
        let frames = vec![Bytes::from_static(b"a/b"), Bytes::from_static(b"{not json")];
        assert!(matches!(
            decode(&frames),
            Err(DecodeError::InvalidPayload { .. })
        ));
    }

    /// Тест проверяет, что топик должен быть непустой UTF-8 строкой.
    #[test]
    fn test_decode_bad_topic() {
        let empty = vec![Bytes::new(), Bytes::from_static(b"{}")];
        assert!(matches!(
            decode(&empty),
            Err(DecodeError::MalformedFrame { .. })
        ));

        let not_utf8 = vec![Bytes::from(vec![0xff, 0xfe]), Bytes::from_static(b"{}")];
        assert!(matches!(
            decode(&not_utf8),
            Err(DecodeError::MalformedFrame { .. })
        ));
    }

    /// Тест проверяет, что неожиданная форма payload не считается ошибкой.
    #[test]
    fn test_decode_accepts_any_json_shape() {
        for body in [&b"42"[..], b"\"text\"", b"null", b"[1,2]"] {
            let frames = vec![Bytes::from_static(b"t"), Bytes::copy_from_slice(body)];
            assert!(decode(&frames).is_ok(), "body {:?}", body);
        }
    }

    /// Тест проверяет, что лишние кадры игнорируются.
    #[test]
    fn test_decode_ignores_extra_frames() {
        let frames = vec![
            Bytes::from_static(b"t"),
            Bytes::from_static(b"{}"),
            Bytes::from_static(b"trailer"),
        ];
        assert_eq!(decode(&frames).unwrap(), Message::new("t", json!({})));
    }
}
