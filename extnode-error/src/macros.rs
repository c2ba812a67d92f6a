/// Возвращает `Err(StackError)` из текущей функции.
///
/// `bail!(err)` принимает любую ошибку с [`ErrorExt`](crate::ErrorExt),
/// `bail!(code, "fmt", args..)` собирает [`GenericError`](crate::GenericError)
/// с кодом и текстом.
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $($fmt:tt)+) => {
        return Err($crate::StackError::new(
            $crate::GenericError::new($code, format!($($fmt)+))
        ))
    };
}

/// Добавляет пояснение к ошибке `Result`, превращая её в
/// [`StackError`](crate::StackError).
pub trait ResultExt<T> {
    /// Текст пояснения строится только при ошибке.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(f())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
