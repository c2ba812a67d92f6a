use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки публикации сообщения.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Узел ещё не подключён или уже остановлен
    #[error("Node is not connected")]
    NotConnected,
    /// Буфер исходящих сообщений заполнен (обычно во время обрыва связи)
    #[error("Publish buffer is full ({capacity} frames)")]
    Backpressure { capacity: usize },
    /// Пустой топик
    #[error("Topic must be a non-empty string")]
    InvalidTopic,
    /// Кадр сообщения длиннее, чем допускает формат кадра
    #[error("Message frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
}

/// Ошибки управления жизненным циклом узла.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Переход недопустим из текущего состояния; состояние не изменилось
    #[error("Cannot {action} node in state '{from}'")]
    InvalidTransition { from: String, action: String },
}

impl ErrorExt for PublishError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotConnected => StatusCode::NotConnected,
            Self::Backpressure { .. } => StatusCode::Backpressure,
            Self::InvalidTopic => StatusCode::InvalidTopic,
            Self::TooLarge { .. } => StatusCode::MessageTooLarge,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for LifecycleError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidTransition
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
