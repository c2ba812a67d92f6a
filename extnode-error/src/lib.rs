pub mod ext;
pub mod macros;
pub mod stack;
pub mod status_code;
pub mod types;

// Публичный экспорт трейта, кодов и типов ошибок
pub use ext::*;
pub use macros::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

/// Результат составных операций узла (подключение, запуск, ожидание).
pub type NodeResult<T> = Result<T, StackError>;
