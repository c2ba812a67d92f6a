use serde::{Deserialize, Serialize};

/// Полезная нагрузка сообщения.
///
/// Структурированное JSON-значение (null, bool, число, строка, массив,
/// объект); обработчик сопоставляет форму через `match` и сам решает, что
/// делать с неожиданной формой.
pub type Payload = serde_json::Value;

/// Конверт `{topic, payload}`, которым обмениваются узлы через брокер.
///
/// Топик: непустая иерархическая строка с разделителем `/`, например
/// `adapter_core/exts/operate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    #[serde(default)]
    pub payload: Payload,
}

impl Message {
    pub fn new(
        topic: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Разбирает сообщение из JSON-текста вида `{"topic": ..., "payload": ...}`.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Возвращает `true`, если топик пригоден для отправки.
    pub fn has_valid_topic(&self) -> bool {
        !self.topic.is_empty()
    }

    /// Строковое поле полезной нагрузки, если payload является объектом.
    pub fn payload_str(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}
