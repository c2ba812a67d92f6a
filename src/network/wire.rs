//! Побайтовое кадрирование multipart-сообщений поверх TCP.
//!
//! Каждый кадр: `flags: u8` (бит 0 = MORE) + `len: u32 BE` + тело.
//! Сообщение заканчивается кадром без флага MORE.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use extnode_error::WireError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::codec::Multipart;

/// Флаг «за этим кадром следует ещё один кадр того же сообщения».
pub const FLAG_MORE: u8 = 0x01;

/// Размер заголовка кадра: флаги + длина.
pub const HEADER_LEN: usize = 5;

/// Максимальная длина тела одного кадра.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Первый байт кадра на сокете подписки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SubscriptionKind {
    Unsubscribe = 0x00,
    Subscribe = 0x01,
}

/// Проверяет, что каждая часть сообщения помещается в один кадр.
pub fn check_frame_lengths(parts: &[Bytes]) -> Result<(), WireError> {
    match parts.iter().map(Bytes::len).find(|&len| len > MAX_FRAME_LEN) {
        Some(len) => Err(WireError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        }),
        None => Ok(()),
    }
}

/// Дописывает multipart-сообщение в буфер.
///
/// Длины частей должны пройти [`check_frame_lengths`].
pub fn encode_multipart(
    parts: &[Bytes],
    dst: &mut BytesMut,
) {
    let total: usize = parts.iter().map(|p| HEADER_LEN + p.len()).sum();
    dst.reserve(total);

    let last = parts.len().saturating_sub(1);
    for (i, part) in parts.iter().enumerate() {
        debug_assert!(part.len() <= MAX_FRAME_LEN);
        let flags = if i < last { FLAG_MORE } else { 0 };
        dst.put_u8(flags);
        dst.put_u32(part.len() as u32);
        dst.put_slice(part);
    }
}

/// Кадр подписки на префикс топика.
pub fn subscribe_frame(topic: &str) -> Bytes {
    subscription_frame(SubscriptionKind::Subscribe, topic)
}

/// Кадр отписки от префикса топика.
pub fn unsubscribe_frame(topic: &str) -> Bytes {
    subscription_frame(SubscriptionKind::Unsubscribe, topic)
}

fn subscription_frame(
    kind: SubscriptionKind,
    topic: &str,
) -> Bytes {
    let mut body = BytesMut::with_capacity(1 + topic.len());
    body.put_u8(kind.into());
    body.put_slice(topic.as_bytes());
    body.freeze()
}

/// Разбирает кадр подписки на вид команды и префикс топика.
///
/// Пустой кадр или неизвестный первый байт дают `None`.
pub fn parse_subscription(frame: &[u8]) -> Option<(SubscriptionKind, &[u8])> {
    let (&kind, topic) = frame.split_first()?;
    let kind = SubscriptionKind::try_from(kind).ok()?;
    Some((kind, topic))
}

/// Инкрементальный декодер multipart-сообщений.
///
/// Хранит уже собранные кадры незавершённого сообщения между вызовами,
/// поэтому байты можно подавать частями любой длины.
#[derive(Debug, Default)]
pub struct MultipartDecoder {
    parts: Multipart,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MultipartDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Пытается извлечь из буфера одно полное сообщение.
    ///
    /// Возвращает `Ok(None)`, если данных пока недостаточно. Потреблённые
    /// байты удаляются из `src`.
    pub fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Multipart>, WireError> {
        loop {
            if src.len() < HEADER_LEN {
                return Ok(None);
            }

            let flags = src[0];
            let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
            if len > MAX_FRAME_LEN {
                return Err(WireError::FrameTooLarge {
                    len,
                    max: MAX_FRAME_LEN,
                });
            }
            if src.len() < HEADER_LEN + len {
                src.reserve(HEADER_LEN + len - src.len());
                return Ok(None);
            }

            src.advance(HEADER_LEN);
            self.parts.push(src.split_to(len).freeze());

            if flags & FLAG_MORE == 0 {
                return Ok(Some(std::mem::take(&mut self.parts)));
            }
        }
    }

    /// Сбрасывает незавершённое сообщение (после обрыва соединения).
    pub fn reset(&mut self) {
        self.parts.clear();
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
