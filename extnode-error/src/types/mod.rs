pub mod codec;
pub mod node;
pub mod transport;

// Публичный экспорт ошибок транспорта, кодека и узла
pub use codec::*;
pub use node::*;
pub use transport::*;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка без собственного типа: код и текст (см. [`bail!`](crate::bail)).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
