//! Сетевой транспорт узла.
//!
//! ## Подмодули
//!
//! - `connection`: соединение с брокером (два TCP-сокета, очереди,
//!   переподключение и восстановление подписок).
//! - `wire`: побайтовое кадрирование multipart-сообщений и кадры подписки.
//! - `backoff`: экспоненциальная задержка между попытками переподключения.

pub mod backoff;
pub mod connection;
pub mod wire;

// Публичный экспорт типов транспорта, чтобы упростить доступ к ним из
// внешнего кода.
pub use backoff::Backoff;
pub use connection::*;
