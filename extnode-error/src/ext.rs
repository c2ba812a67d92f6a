use std::{any::Any, error::Error};

use crate::StatusCode;

/// Общий интерфейс ошибок узла.
///
/// Трейт object-safe: [`StackError`](crate::StackError) хранит корневую
/// ошибку как `dyn ErrorExt` и через [`as_any`](ErrorExt::as_any) отдаёт
/// её конкретный тип.
pub trait ErrorExt: Error + Send + Sync + 'static {
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn as_any(&self) -> &dyn Any;
}
