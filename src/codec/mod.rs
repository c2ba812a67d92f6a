//! Кодек конверта сообщений.
//!
//! - `envelope`: преобразование [`Message`](crate::Message) в двухкадровое
//!   представление (топик + JSON) и обратно.
//!
//! Побайтовое кадрирование поверх TCP находится в
//! [`network::wire`](crate::network::wire).

pub mod envelope;

pub use envelope::{decode, encode, Multipart};
