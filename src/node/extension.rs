//! Сообщения расширения: уведомления, статус, адресация по
//! `extension_id`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{topics::SCRATCH_TOPIC, Message, Payload};

/// Уровень уведомления для пользовательского интерфейса.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        })
    }
}

/// `{type, extension_id, content}` для топика уведомлений.
pub fn notification_payload(
    extension_id: &str,
    level: NotificationLevel,
    content: Payload,
) -> Payload {
    json!({
        "type": level,
        "extension_id": extension_id,
        "content": content,
    })
}

/// `{extension_id, content}` для топика статуса.
pub fn status_payload(
    extension_id: &str,
    content: Payload,
) -> Payload {
    json!({
        "extension_id": extension_id,
        "content": content,
    })
}

/// Дописывает `extension_id` в payload-объект, если поле отсутствует,
/// равно `null` или пустой строке. Payload другой формы не меняется.
pub fn fill_extension_id(
    payload: &mut Payload,
    extension_id: &str,
) {
    let Some(obj) = payload.as_object_mut() else {
        return;
    };
    let missing = match obj.get("extension_id") {
        None | Some(Payload::Null) => true,
        Some(Payload::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if missing {
        obj.insert("extension_id".to_string(), extension_id.into());
    }
}

/// Сообщение от Scratch, адресованное расширению с этим идентификатором.
pub fn is_for_extension(
    message: &Message,
    extension_id: &str,
) -> bool {
    message.topic == SCRATCH_TOPIC && message.payload_str("extension_id") == Some(extension_id)
}
