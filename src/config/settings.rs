use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{network::ConnectOptions, topics::OPERATE_TOPIC};

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "EXTNODE";

/// Настройки узла.
///
/// Все длительности задаются в миллисекундах; для них есть методы,
/// возвращающие [`Duration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Имя узла
    pub name: String,
    /// Идентификатор расширения; если не задан, используется `name`
    pub extension_id: Option<String>,
    /// Хост брокера
    pub host: String,
    /// Порт брокера для входящих (подписочных) сокетов
    pub subscriber_port: u16,
    /// Порт брокера для исходящих (публикующих) сокетов
    pub publisher_port: u16,
    /// Сколько ждать входящее сообщение до проверки состояния
    pub receive_timeout_ms: u64,
    /// Пауза после подключения, пока брокер применяет подписки
    pub settle_ms: u64,
    /// Таймаут TCP-подключения и записи кадра
    pub connect_timeout_ms: u64,
    /// Начальная задержка переподключения
    pub backoff_initial_ms: u64,
    /// Максимальная задержка переподключения
    pub backoff_max_ms: u64,
    /// Ёмкость очереди исходящих сообщений
    pub publish_buffer: usize,
    /// Ёмкость очереди входящих сообщений
    pub inbound_buffer: usize,
    /// Зарезервированный управляющий топик
    pub control_topic: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "extnode".to_string(),
            extension_id: None,
            host: "127.0.0.1".to_string(),
            subscriber_port: 16103,
            publisher_port: 16130,
            receive_timeout_ms: 100,
            settle_ms: 300,
            connect_timeout_ms: 3000,
            backoff_initial_ms: 100,
            backoff_max_ms: 5000,
            publish_buffer: 1024,
            inbound_buffer: 1024,
            control_topic: OPERATE_TOPIC.to_string(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl NodeConfig {
    /// Настройки по умолчанию с заданным именем узла.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_broker(
        mut self,
        host: impl Into<String>,
        subscriber_port: u16,
        publisher_port: u16,
    ) -> Self {
        self.host = host.into();
        self.subscriber_port = subscriber_port;
        self.publisher_port = publisher_port;
        self
    }

    pub fn with_extension_id(
        mut self,
        extension_id: impl Into<String>,
    ) -> Self {
        self.extension_id = Some(extension_id.into());
        self
    }

    /// Загружает настройки: значения по умолчанию, затем `EXTNODE_*`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(None)
    }

    /// Загружает настройки с файлом между умолчаниями и окружением.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(Some(path.as_ref()))
    }

    fn build(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("name", defaults.name)?
            .set_default("host", defaults.host)?
            .set_default("subscriber_port", i64::from(defaults.subscriber_port))?
            .set_default("publisher_port", i64::from(defaults.publisher_port))?
            .set_default("control_topic", defaults.control_topic)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let cfg = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Проверяет согласованность настроек.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Message(msg.to_string()));

        if self.name.trim().is_empty() {
            return fail("node name must not be empty");
        }
        if self.extension_id.as_deref().is_some_and(str::is_empty) {
            return fail("extension_id must not be empty when set");
        }
        if self.host.is_empty() {
            return fail("broker host must not be empty");
        }
        if self.subscriber_port == 0 || self.publisher_port == 0 {
            return fail("broker ports must be non-zero");
        }
        if self.control_topic.is_empty() {
            return fail("control topic must not be empty");
        }
        if self.publish_buffer == 0 || self.inbound_buffer == 0 {
            return fail("buffers must hold at least one message");
        }
        if self.receive_timeout_ms == 0 {
            return fail("receive timeout must be positive");
        }
        if self.backoff_initial_ms == 0 || self.backoff_initial_ms > self.backoff_max_ms {
            return fail("backoff_initial_ms must be in 1..=backoff_max_ms");
        }
        Ok(())
    }

    /// Имя, по которому узел адресуется в управляющих сообщениях.
    pub fn identity(&self) -> &str {
        self.extension_id.as_deref().unwrap_or(&self.name)
    }

    pub fn publish_addr(&self) -> String {
        format!("{}:{}", self.host, self.publisher_port)
    }

    pub fn subscribe_addr(&self) -> String {
        format!("{}:{}", self.host, self.subscriber_port)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            publish_addr: self.publish_addr(),
            subscribe_addr: self.subscribe_addr(),
            connect_timeout: self.connect_timeout(),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            publish_buffer: self.publish_buffer,
            inbound_buffer: self.inbound_buffer,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
