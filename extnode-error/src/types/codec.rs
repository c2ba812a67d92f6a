use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка декодирования входящего конверта `{topic, payload}`.
///
/// Такое сообщение логируется и отбрасывается, цикл доставки продолжает
/// работу.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Кадров меньше двух, либо кадр топика не является непустой UTF-8 строкой
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },
    /// Кадр полезной нагрузки не является корректным JSON
    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },
}

impl ErrorExt for DecodeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedFrame { .. } => StatusCode::InvalidFrame,
            Self::InvalidPayload { .. } => StatusCode::InvalidPayload,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
