//! Узел шины: соединение, подписки, жизненный цикл и цикл доставки.
//!
//! ## Подмодули
//!
//! - `lifecycle`: состояния узла и допустимые переходы.
//! - `control`: управляющие сообщения `start` / `stop`.
//! - `dispatch`: фоновый цикл приёма и доставки сообщений.
//! - `extension`: уведомления и статус расширения.

pub mod control;
pub mod dispatch;
pub mod extension;
pub mod lifecycle;

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use extnode_error::{
    bail, GenericError, LifecycleError, NodeResult, PublishError, ResultExt, StackError,
    StatusCode,
};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use control::{OperateAction, OperateCommand};
pub use dispatch::{DispatchStats, IdleHook, StatsSnapshot};
pub use extension::NotificationLevel;
pub use lifecycle::{Lifecycle, LifecycleState, Transition};

use self::dispatch::Dispatcher;
use crate::{
    codec,
    config::NodeConfig,
    network::{Connection, TransportState},
    pubsub::{HandlerResult, SubscriptionHandle, TopicRouter},
    topics::{ADAPTER_TOPIC, NOTIFICATION_TOPIC, SCRATCH_TOPIC, STATUS_TOPIC},
    Message, Payload,
};

/// Узел шины сообщений.
///
/// Дешёвый в клонировании дескриптор; все клоны управляют одним узлом.
/// Когда последний клон уничтожен, узел останавливается. Обработчикам,
/// которым нужен доступ к узлу, следует захватывать [`WeakNode`].
///
/// ```ignore
/// let node = Node::new(NodeConfig::new("extension_eim"));
/// node.subscribe("from_scratch/extensions", |msg| {
///     println!("{}", msg.payload);
///     Ok(())
/// });
/// node.run_forever().await?;
/// ```
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Слабая ссылка на узел, не продлевающая его жизнь.
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

struct NodeInner {
    config: NodeConfig,
    router: Arc<TopicRouter>,
    lifecycle: Lifecycle,
    connection: RwLock<Option<Arc<Connection>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    idle_hook: Arc<RwLock<Option<IdleHook>>>,
    stats: Arc<DispatchStats>,
    connect_lock: tokio::sync::Mutex<()>,
}

/// Создаёт узел и подключает его к брокеру.
///
/// Узел остаётся в состоянии `connected`: управляющие сообщения уже
/// обрабатываются, но обработчики вызываются только после `start`.
pub async fn connect(config: NodeConfig) -> NodeResult<Node> {
    let node = Node::new(config);
    node.connect().await?;
    Ok(node)
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Node {
    /// Создаёт узел в состоянии `created`. Сокеты не открываются.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                config,
                router: Arc::new(TopicRouter::new()),
                lifecycle: Lifecycle::new(),
                connection: RwLock::new(None),
                dispatch: Mutex::new(None),
                idle_hook: Arc::new(RwLock::new(None)),
                stats: Arc::new(DispatchStats::default()),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Открывает соединение, подписывается на управляющий топик и все
    /// зарегистрированные шаблоны, запускает цикл доставки.
    pub async fn connect(&self) -> NodeResult<()> {
        let inner = &self.inner;
        let _guard = inner.connect_lock.lock().await;

        let state = inner.lifecycle.state();
        if state != LifecycleState::Created {
            bail!(LifecycleError::InvalidTransition {
                from: state.to_string(),
                action: Transition::Connect.as_str().to_string(),
            });
        }

        inner
            .config
            .validate()
            .map_err(|e| StackError::new(GenericError::new(StatusCode::InvalidArgs, e.to_string())))?;

        let connection = Arc::new(
            Connection::connect(inner.config.connect_options())
                .await
                .with_context(|| format!("Failed to connect node '{}'", inner.config.name))?,
        );
        *inner.connection.write() = Some(connection.clone());

        connection.subscribe_topic(&inner.config.control_topic);
        for pattern in inner.router.patterns() {
            connection.subscribe_topic(&pattern);
        }

        // stop() мог прийти во время подключения
        if let Err(e) = inner.lifecycle.apply(Transition::Connect) {
            connection.close().await;
            return Err(e.into());
        }

        let dispatcher = Dispatcher {
            node_name: inner.config.identity().to_string(),
            control_topic: inner.config.control_topic.clone(),
            router: inner.router.clone(),
            lifecycle: inner.lifecycle.clone(),
            connection,
            receive_timeout: inner.config.receive_timeout(),
            idle_hook: inner.idle_hook.clone(),
            stats: inner.stats.clone(),
        };
        *inner.dispatch.lock() = Some(tokio::spawn(dispatcher.run()));

        info!(
            node = %inner.config.name,
            broker = %inner.config.host,
            "Node connected"
        );

        // Даём брокеру применить подписки до первой публикации
        tokio::time::sleep(inner.config.settle_time()).await;
        Ok(())
    }

    /// Переводит узел в `running`, при необходимости сначала подключая его.
    pub async fn start(&self) -> NodeResult<()> {
        if self.state() == LifecycleState::Created {
            self.connect().await?;
        }
        self.transition(Transition::Start)?;
        Ok(())
    }

    /// Приостанавливает доставку: входящие сообщения читаются и
    /// отбрасываются, публикация остаётся доступной.
    pub fn pause(&self) -> Result<(), LifecycleError> {
        self.transition(Transition::Pause).map(|_| ())
    }

    pub fn resume(&self) -> Result<(), LifecycleError> {
        self.transition(Transition::Resume).map(|_| ())
    }

    /// Останавливает узел. Повторный вызов ничего не делает.
    ///
    /// Цикл доставки замечает остановку в пределах одного таймаута
    /// ожидания и закрывает соединение; дождаться этого можно через
    /// [`join`](Self::join).
    pub fn stop(&self) {
        let before = self.state();
        let _ = self.inner.lifecycle.apply(Transition::Stop);
        if before != LifecycleState::Stopped {
            info!(node = %self.inner.config.name, from = %before, "Node stopped");
        }
    }

    /// Ждёт остановки узла и завершения цикла доставки.
    pub async fn join(&self) {
        self.inner.lifecycle.wait_stopped().await;
        let handle = self.inner.dispatch.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!(node = %self.inner.config.name, error = %e, "Dispatch task ended abnormally");
            }
        }
    }

    /// Запускает узел и блокирует вызывающую задачу до остановки.
    pub async fn run_forever(&self) -> NodeResult<()> {
        self.start().await?;
        self.join().await;
        Ok(())
    }

    /// Публикует сообщение.
    ///
    /// Разрешено в `connected`, `running` и `paused`. Во время обрыва
    /// связи сообщение ставится в очередь; при заполненной очереди
    /// возвращается [`PublishError::Backpressure`].
    pub fn publish(
        &self,
        topic: &str,
        payload: Payload,
    ) -> Result<(), PublishError> {
        self.publish_message(&Message::new(topic, payload))
    }

    pub fn publish_message(
        &self,
        message: &Message,
    ) -> Result<(), PublishError> {
        if !message.has_valid_topic() {
            return Err(PublishError::InvalidTopic);
        }
        if !self.state().can_publish() {
            return Err(PublishError::NotConnected);
        }
        let connection = self
            .inner
            .connection
            .read()
            .clone()
            .ok_or(PublishError::NotConnected)?;

        connection.send(codec::encode(message))?;
        debug!(node = %self.inner.config.name, topic = %message.topic, "Published");
        Ok(())
    }

    /// Регистрирует обработчик для шаблона (префикса) топика.
    ///
    /// Обработчик вызывается синхронно в задаче цикла доставки и не должен
    /// надолго блокироваться.
    pub fn subscribe<F>(
        &self,
        pattern: &str,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let handle = self.inner.router.subscribe(pattern, callback);
        if let Some(connection) = self.inner.connection.read().as_ref() {
            connection.subscribe_topic(pattern);
        }
        debug!(node = %self.inner.config.name, pattern, "Subscribed");
        handle
    }

    /// Снимает одну регистрацию. Отсутствующая регистрация не ошибка.
    pub fn unsubscribe(
        &self,
        handle: &SubscriptionHandle,
    ) {
        let inner = &self.inner;
        if !inner.router.unsubscribe(handle) {
            return;
        }

        let pattern = handle.pattern();
        if !inner.router.has_pattern(pattern) && pattern != inner.config.control_topic {
            if let Some(connection) = inner.connection.read().as_ref() {
                connection.unsubscribe_topic(pattern);
            }
        }
        debug!(node = %inner.config.name, pattern, "Unsubscribed");
    }

    /// Устанавливает колбэк, вызываемый при каждом таймауте ожидания.
    pub fn on_idle<F>(
        &self,
        hook: F,
    ) where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.idle_hook.write() = Some(Arc::new(hook));
    }

    /// Ждёт, пока все принятые сообщения будут записаны в сокет.
    pub async fn flush(
        &self,
        wait: Duration,
    ) -> NodeResult<()> {
        let connection = self.inner.connection.read().clone();
        let Some(connection) = connection else {
            bail!(PublishError::NotConnected);
        };
        if !connection.flush(wait).await {
            bail!(
                StatusCode::Timeout,
                "{} messages still queued after {:?}",
                connection.pending(),
                wait
            );
        }
        Ok(())
    }

    /// Публикует уведомление от имени расширения.
    pub fn publish_notification(
        &self,
        content: Payload,
        level: NotificationLevel,
    ) -> Result<(), PublishError> {
        let payload = extension::notification_payload(self.identity(), level, content);
        self.publish(NOTIFICATION_TOPIC, payload)
    }

    /// Публикует статус расширения.
    pub fn publish_status(
        &self,
        content: Payload,
    ) -> Result<(), PublishError> {
        let payload = extension::status_payload(self.identity(), content);
        self.publish(STATUS_TOPIC, payload)
    }

    /// Публикует сообщение от имени расширения.
    ///
    /// Без топика используется `from_adapter/extensions`. В payload-объект
    /// дописывается `extension_id` узла, если своего там нет.
    pub fn publish_extension(
        &self,
        topic: Option<&str>,
        mut payload: Payload,
    ) -> Result<(), PublishError> {
        extension::fill_extension_id(&mut payload, self.identity());
        self.publish(topic.unwrap_or(ADAPTER_TOPIC), payload)
    }

    /// Регистрирует обработчик сообщений Scratch, адресованных этому
    /// расширению: топик `from_scratch/extensions` и `extension_id`,
    /// равный [`identity`](Self::identity). Остальные сообщения на этом
    /// топике обработчик не видит.
    pub fn on_extension_message<F>(
        &self,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let extension_id = self.identity().to_string();
        self.subscribe(SCRATCH_TOPIC, move |msg| {
            if extension::is_for_extension(msg, &extension_id) {
                callback(msg)
            } else {
                Ok(())
            }
        })
    }

    /// Отправляет управляющую команду другому узлу.
    pub fn send_operate(
        &self,
        target: &str,
        action: OperateAction,
    ) -> Result<(), PublishError> {
        let command = OperateCommand::new(target, action);
        self.publish(&self.inner.config.control_topic, command.to_payload())
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    /// Приёмник уведомлений о смене состояния.
    pub fn watch_state(&self) -> tokio::sync::watch::Receiver<LifecycleState> {
        self.inner.lifecycle.subscribe()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Имя, по которому узел адресуется в управляющих сообщениях.
    pub fn identity(&self) -> &str {
        self.inner.config.identity()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Состояние транспорта или `None`, если узел ещё не подключался.
    pub fn transport_state(&self) -> Option<TransportState> {
        self.inner.connection.read().as_ref().map(|c| c.state())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn transition(
        &self,
        transition: Transition,
    ) -> Result<LifecycleState, LifecycleError> {
        let state = self.inner.lifecycle.apply(transition)?;
        debug!(node = %self.inner.config.name, action = transition.as_str(), %state, "Transition applied");
        Ok(state)
    }
}

impl WeakNode {
    /// Возвращает узел, если он ещё жив.
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        if self.lifecycle.state() != LifecycleState::Stopped {
            let _ = self.lifecycle.apply(Transition::Stop);
            debug!(node = %self.config.name, "Node dropped, stopping");
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .field("transport", &self.transport_state())
            .finish()
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WeakNode")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
