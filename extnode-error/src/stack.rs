use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, StatusCode};

/// Ошибка составной операции узла (подключение, запуск, сброс очереди).
///
/// Хранит корневую ошибку и цепочку пояснений, добавленных по пути наверх.
/// Каждое пояснение помнит место вызова.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    notes: Vec<Note>,
}

/// Пояснение к ошибке и место, где оно добавлено.
#[derive(Debug, Clone)]
pub struct Note {
    pub message: String,
    pub location: &'static Location<'static>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            notes: Vec::new(),
        }
    }

    /// Добавляет пояснение, запоминая место вызова.
    #[track_caller]
    pub fn context(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.notes.push(Note {
            message: message.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Пояснения в порядке добавления: от ближайшего к корню.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Корневая ошибка как конкретный тип, если он совпадает.
    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let notes: Vec<String> = self
            .notes
            .iter()
            .map(|n| format!("{} at {}:{}", n.message, n.location.file(), n.location.line()))
            .collect();
        f.debug_struct("StackError")
            .field("root", &self.root.to_string())
            .field("status", &self.status_code())
            .field("notes", &notes)
            .finish()
    }
}

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // Внешнее пояснение первым
        for note in self.notes.iter().rev() {
            write!(f, "{}: ", note.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(err: E) -> Self {
        StackError::new(err)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
