use std::time::Duration;

/// Экспоненциальная задержка между попытками переподключения.
///
/// Каждая следующая задержка вдвое больше предыдущей, но не превышает
/// `max`. К задержке добавляется случайный разброс до 10%.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(
        initial: Duration,
        max: Duration,
    ) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Возвращает задержку перед следующей попыткой и удваивает базу.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);

        let jitter_ms = (base.as_millis() as u64 / 10).max(1);
        let jitter = Duration::from_millis(fastrand::u64(0..=jitter_ms));
        (base + jitter).min(self.max)
    }

    /// Сбрасывает задержку к начальной после успешного подключения.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет рост задержки и её ограничение сверху.
    #[test]
    fn test_backoff_growth_and_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));

        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));

        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(200));

        for _ in 0..10 {
            assert!(backoff.next_delay() <= Duration::from_secs(1));
        }
    }

    /// Тест проверяет сброс к начальной задержке.
    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_secs(5));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();

        assert!(backoff.next_delay() <= Duration::from_millis(55));
    }
}
