//! Управляющие сообщения на зарезервированном топике.
//!
//! Формат: `{"content": "start" | "stop", "node_name": "<имя узла>"}`.
//! Поле `extension_id` принимается как синоним `node_name`; если есть оба,
//! адресатом считается `node_name`, а `extension_id` обычно означает
//! отправителя.

use serde::{Deserialize, Serialize};

use crate::Payload;

/// Команда управляющего сообщения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperateAction {
    Start,
    Stop,
}

/// Управляющее сообщение, адресованное узлу по имени.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOperate")]
pub struct OperateCommand {
    pub content: OperateAction,
    pub node_name: String,
}

/// Управляющее сообщение в том виде, в каком оно приходит из шины.
#[derive(Deserialize)]
struct RawOperate {
    content: OperateAction,
    node_name: Option<String>,
    extension_id: Option<String>,
}

impl TryFrom<RawOperate> for OperateCommand {
    type Error = &'static str;

    fn try_from(raw: RawOperate) -> Result<Self, Self::Error> {
        let node_name = raw
            .node_name
            .or(raw.extension_id)
            .ok_or("missing field `node_name`")?;
        Ok(Self {
            content: raw.content,
            node_name,
        })
    }
}

impl OperateCommand {
    pub fn new(
        node_name: impl Into<String>,
        content: OperateAction,
    ) -> Self {
        Self {
            content,
            node_name: node_name.into(),
        }
    }

    /// Разбирает payload управляющего сообщения.
    ///
    /// Неизвестная команда или отсутствующее имя дают ошибку; вызывающий
    /// код логирует её и игнорирует сообщение.
    pub fn from_payload(payload: &Payload) -> serde_json::Result<Self> {
        Self::deserialize(payload)
    }

    pub fn to_payload(&self) -> Payload {
        serde_json::json!({
            "content": self.content,
            "node_name": self.node_name,
        })
    }

    /// Адресовано ли сообщение узлу с этим именем.
    pub fn is_for(
        &self,
        node_name: &str,
    ) -> bool {
        self.node_name == node_name
    }
}
