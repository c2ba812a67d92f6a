use std::{any::Any, io};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка установления соединения с брокером.
///
/// Возвращается только при первичном подключении; после обрыва уже
/// установленного соединения узел переподключается сам.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Брокер недоступен по указанному адресу
    #[error("Failed to connect to {address}: {reason}")]
    Unreachable { address: String, reason: String },
    /// Подключение не завершилось за отведённое время
    #[error("Connection timeout to {address}")]
    Timeout { address: String },
}

/// Ошибки уровня кадров на сокете.
///
/// Не выходят за пределы транспорта: логируются и приводят к
/// переподключению.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Заявленная длина кадра превышает допустимую
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },
    /// Ошибка ввода-вывода
    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },
}

impl ErrorExt for ConnectError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unreachable { .. } => StatusCode::ConnectionFailed,
            Self::Timeout { .. } => StatusCode::Timeout,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for WireError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::FrameTooLarge { .. } => StatusCode::FrameTooLarge,
            Self::Io { kind, .. } => match kind {
                io::ErrorKind::UnexpectedEof => StatusCode::UnexpectedEof,
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe => StatusCode::ConnectionClosed,
                _ => StatusCode::Io,
            },
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// Конверсия из io::Error
impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
