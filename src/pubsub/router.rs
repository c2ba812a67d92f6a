use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::Message;

/// Ошибка, которую может вернуть обработчик сообщения.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Результат обработчика сообщения.
pub type HandlerResult = Result<(), HandlerError>;

type Callback = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// Зарегистрированный обработчик.
#[derive(Clone)]
pub struct Handler {
    id: u64,
    pattern: Arc<str>,
    callback: Callback,
}

/// Дескриптор подписки, возвращаемый при регистрации. Нужен для отписки.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    pattern: Arc<str>,
}

/// Набор подписок узла.
///
/// Шаблон совпадает с топиком, если топик начинается с шаблона (простое
/// строковое сравнение префикса, как у фильтра брокера). Пустой шаблон
/// совпадает с любым топиком.
#[derive(Default)]
pub struct TopicRouter {
    handlers: RwLock<Vec<Handler>>,
    next_id: AtomicU64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Handler {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Вызывает обработчик.
    pub fn call(
        &self,
        message: &Message,
    ) -> HandlerResult {
        (self.callback)(message)
    }
}

impl SubscriptionHandle {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует обработчик для шаблона.
    ///
    /// Один и тот же шаблон можно регистрировать несколько раз; все
    /// обработчики вызываются в порядке регистрации.
    pub fn subscribe<F>(
        &self,
        pattern: &str,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pattern: Arc<str> = Arc::from(pattern);
        self.handlers.write().push(Handler {
            id,
            pattern: pattern.clone(),
            callback: Arc::new(callback),
        });
        SubscriptionHandle { id, pattern }
    }

    /// Удаляет одну регистрацию. Возвращает `false`, если её уже нет.
    pub fn unsubscribe(
        &self,
        handle: &SubscriptionHandle,
    ) -> bool {
        let mut handlers = self.handlers.write();
        match handlers.iter().position(|h| h.id == handle.id) {
            Some(idx) => {
                handlers.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Обработчики, чьи шаблоны совпадают с топиком, в порядке регистрации.
    ///
    /// Возвращает снимок: обработчики вызываются без удержания блокировки,
    /// поэтому внутри них можно подписываться и отписываться.
    pub fn matching(
        &self,
        topic: &str,
    ) -> Vec<Handler> {
        self.handlers
            .read()
            .iter()
            .filter(|h| topic_matches(&h.pattern, topic))
            .cloned()
            .collect()
    }

    /// Уникальные шаблоны в порядке первой регистрации.
    pub fn patterns(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        let mut out: Vec<String> = Vec::new();
        for h in handlers.iter() {
            if !out.iter().any(|p| p.as_str() == &*h.pattern) {
                out.push(h.pattern.to_string());
            }
        }
        out
    }

    /// Есть ли хотя бы один обработчик с таким шаблоном.
    pub fn has_pattern(
        &self,
        pattern: &str,
    ) -> bool {
        self.handlers.read().iter().any(|h| &*h.pattern == pattern)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

/// Совпадает ли топик с шаблоном подписки.
pub fn topic_matches(
    pattern: &str,
    topic: &str,
) -> bool {
    topic.starts_with(pattern)
}

impl fmt::Debug for Handler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for TopicRouter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TopicRouter")
            .field("handlers", &*self.handlers.read())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    ) -> impl Fn(&Message) -> HandlerResult + Send + Sync + 'static {
        let log = log.clone();
        move |msg| {
            log.lock().unwrap().push(format!("{tag}:{}", msg.topic));
            Ok(())
        }
    }

    /// Тест проверяет сопоставление по префиксу.
    #[test]
    fn test_prefix_matching() {
        assert!(topic_matches("a/b", "a/b"));
        assert!(topic_matches("a/b", "a/b/c"));
        assert!(!topic_matches("a/b", "a/x"));
        assert!(!topic_matches("a/b/c", "a/b"));
        assert!(topic_matches("", "anything"));
    }

    /// Тест проверяет порядок вызова обработчиков.
    #[test]
    fn test_registration_order() {
        let router = TopicRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.subscribe("a", recorder(&log, "first"));
        router.subscribe("a/b", recorder(&log, "second"));
        router.subscribe("a", recorder(&log, "third"));
        router.subscribe("z", recorder(&log, "never"));

        let msg = Message::new("a/b/c", json!({}));
        for h in router.matching(&msg.topic) {
            h.call(&msg).unwrap();
        }

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:a/b/c", "second:a/b/c", "third:a/b/c"]
        );
    }

    /// Тест проверяет, что без совпадений возвращается пустой список.
    #[test]
    fn test_no_match_is_empty() {
        let router = TopicRouter::new();
        router.subscribe("a/b", |_| Ok(()));
        assert!(router.matching("a/x").is_empty());
    }

    /// Тест проверяет отписку одной регистрации из нескольких.
    #[test]
    fn test_unsubscribe_single_registration() {
        let router = TopicRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = router.subscribe("t", recorder(&log, "1"));
        router.subscribe("t", recorder(&log, "2"));

        assert!(router.unsubscribe(&first));
        assert!(!router.unsubscribe(&first));
        assert!(router.has_pattern("t"));
        assert_eq!(router.len(), 1);

        let msg = Message::new("t", json!(null));
        for h in router.matching("t") {
            h.call(&msg).unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["2:t"]);
    }

    /// Тест проверяет список уникальных шаблонов.
    #[test]
    fn test_patterns_dedup() {
        let router = TopicRouter::new();
        router.subscribe("b", |_| Ok(()));
        router.subscribe("a", |_| Ok(()));
        router.subscribe("b", |_| Ok(()));

        assert_eq!(router.patterns(), vec!["b".to_string(), "a".to_string()]);
    }

    /// Тест проверяет, что обработчик может подписываться во время вызова.
    #[test]
    fn test_subscribe_from_handler() {
        let router = Arc::new(TopicRouter::new());
        let inner = router.clone();
        router.subscribe("t", move |_| {
            inner.subscribe("u", |_| Ok(()));
            Ok(())
        });

        let msg = Message::new("t", json!({}));
        for h in router.matching("t") {
            h.call(&msg).unwrap();
        }
        assert!(router.has_pattern("u"));
    }
}
