use std::fmt;

/// Категория ошибки узла.
///
/// Сотни обозначают источник:
/// - 1xx: вызывающая сторона (аргументы, топик, переход состояния);
/// - 2xx: ограничения очереди публикаций и размера сообщения;
/// - 3xx: сокеты и соединение с брокером;
/// - 4xx: входящие данные (кадры и конверты).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum StatusCode {
    Internal = 100,
    InvalidArgs = 101,
    InvalidTopic = 102,
    InvalidTransition = 103,

    Backpressure = 200,
    MessageTooLarge = 201,

    Io = 300,
    ConnectionFailed = 301,
    ConnectionClosed = 302,
    Timeout = 303,
    UnexpectedEof = 304,
    NotConnected = 305,

    InvalidFrame = 400,
    FrameTooLarge = 401,
    InvalidPayload = 402,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Может ли та же операция пройти позже без изменений со стороны
    /// вызывающего: очередь публикаций освобождается, брокер возвращается.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Backpressure | Self::Timeout | Self::ConnectionFailed | Self::ConnectionClosed
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{self:?}/{}", self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
