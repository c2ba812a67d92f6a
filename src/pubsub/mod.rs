//! Маршрутизация входящих сообщений по подпискам.
//!
//! - `router`: набор шаблонов подписок и сопоставление топика с
//!   обработчиками в порядке регистрации.

pub mod router;

// Публичный экспорт всех типов из вложенных модулей, чтобы упростить
// доступ к ним из внешнего кода.
pub use router::*;
