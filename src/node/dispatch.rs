use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::{
    control::{OperateAction, OperateCommand},
    lifecycle::{Lifecycle, LifecycleState, Transition},
};
use crate::{
    codec::{self, Multipart},
    network::{Connection, Received},
    pubsub::{Handler, TopicRouter},
    Message,
};

/// Колбэк, вызываемый при каждом таймауте ожидания в состоянии `running`.
pub type IdleHook = Arc<dyn Fn() + Send + Sync>;

/// Счётчики цикла доставки.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    handler_errors: AtomicU64,
    decode_errors: AtomicU64,
    discarded: AtomicU64,
}

/// Снимок счётчиков цикла доставки.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Успешные вызовы обработчиков
    pub delivered: u64,
    /// Обработчики, вернувшие ошибку или запаниковавшие
    pub handler_errors: u64,
    /// Сообщения, которые не удалось декодировать
    pub decode_errors: u64,
    /// Сообщения, отброшенные вне состояния `running`
    pub discarded: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Цикл доставки входящих сообщений.
///
/// Работает в отдельной задаче с момента подключения до остановки узла.
/// Управляющие сообщения обрабатываются в любом активном состоянии,
/// остальные доставляются обработчикам только в `running`. Закрытие
/// соединения выполняется последним действием цикла.
pub(crate) struct Dispatcher {
    pub(crate) node_name: String,
    pub(crate) control_topic: String,
    pub(crate) router: Arc<TopicRouter>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) connection: Arc<Connection>,
    pub(crate) receive_timeout: Duration,
    pub(crate) idle_hook: Arc<RwLock<Option<IdleHook>>>,
    pub(crate) stats: Arc<DispatchStats>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Dispatcher {
    pub(crate) async fn run(self) {
        info!(node = %self.node_name, "Dispatch loop started");

        loop {
            if self.lifecycle.state() == LifecycleState::Stopped {
                break;
            }

            match self.connection.receive(self.receive_timeout).await {
                Received::Frames(frames) => self.handle_frames(frames),
                Received::Timeout => self.on_idle(),
                Received::Closed => {
                    warn!(node = %self.node_name, "Transport closed, stopping node");
                    let _ = self.lifecycle.apply(Transition::Stop);
                    break;
                }
            }
        }

        self.connection.close().await;
        info!(
            node = %self.node_name,
            stats = ?self.stats.snapshot(),
            "Dispatch loop stopped"
        );
    }

    fn handle_frames(
        &self,
        frames: Multipart,
    ) {
        let message = match codec::decode(&frames) {
            Ok(message) => message,
            Err(e) => {
                DispatchStats::bump(&self.stats.decode_errors);
                warn!(node = %self.node_name, error = %e, "Dropping undecodable message");
                return;
            }
        };

        if message.topic == self.control_topic {
            self.handle_control(&message);
        }

        let state = self.lifecycle.state();
        if state != LifecycleState::Running {
            DispatchStats::bump(&self.stats.discarded);
            trace!(node = %self.node_name, topic = %message.topic, %state, "Discarding message");
            return;
        }

        for handler in self.router.matching(&message.topic) {
            // Обработчик мог остановить или приостановить узел
            if self.lifecycle.state() != LifecycleState::Running {
                break;
            }
            self.invoke(&handler, &message);
        }
    }

    fn handle_control(
        &self,
        message: &Message,
    ) {
        let command = match OperateCommand::from_payload(&message.payload) {
            Ok(command) => command,
            Err(e) => {
                debug!(node = %self.node_name, error = %e, "Ignoring malformed control message");
                return;
            }
        };
        if !command.is_for(&self.node_name) {
            trace!(node = %self.node_name, target = %command.node_name, "Control message for another node");
            return;
        }

        let transition = match command.content {
            OperateAction::Start => Transition::Start,
            OperateAction::Stop => Transition::Stop,
        };
        match self.lifecycle.apply(transition) {
            Ok(state) => info!(
                node = %self.node_name,
                action = transition.as_str(),
                %state,
                "Control message applied"
            ),
            Err(e) => warn!(node = %self.node_name, error = %e, "Control message rejected"),
        }
    }

    /// Вызывает один обработчик. Ошибка или паника логируются и не
    /// прерывают доставку остальным.
    fn invoke(
        &self,
        handler: &Handler,
        message: &Message,
    ) {
        match catch_unwind(AssertUnwindSafe(|| handler.call(message))) {
            Ok(Ok(())) => DispatchStats::bump(&self.stats.delivered),
            Ok(Err(e)) => {
                DispatchStats::bump(&self.stats.handler_errors);
                warn!(
                    node = %self.node_name,
                    topic = %message.topic,
                    pattern = handler.pattern(),
                    error = %e,
                    "Handler failed"
                );
            }
            Err(panic) => {
                DispatchStats::bump(&self.stats.handler_errors);
                warn!(
                    node = %self.node_name,
                    topic = %message.topic,
                    pattern = handler.pattern(),
                    panic = panic_message(&*panic),
                    "Handler panicked"
                );
            }
        }
    }

    fn on_idle(&self) {
        if self.lifecycle.state() != LifecycleState::Running {
            return;
        }
        let hook = self.idle_hook.read().clone();
        if let Some(hook) = hook {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| hook())) {
                warn!(
                    node = %self.node_name,
                    panic = panic_message(&*panic),
                    "Idle hook panicked"
                );
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("node_name", &self.node_name)
            .field("control_topic", &self.control_topic)
            .field("receive_timeout", &self.receive_timeout)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
