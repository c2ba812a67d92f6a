use std::{fmt, sync::Arc};

use extnode_error::LifecycleError;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Состояние жизненного цикла узла.
///
/// `created → connected → running ⇄ paused → stopped`; `stopped` конечное.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Узел создан, сокеты не открыты
    Created,
    /// Соединение установлено, цикл доставки ещё не запущен
    Connected,
    /// Сообщения доставляются обработчикам
    Running,
    /// Входящие сообщения читаются и отбрасываются
    Paused,
    /// Узел остановлен, соединение закрыто
    Stopped,
}

/// Запрошенный переход.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Connect,
    Start,
    Pause,
    Resume,
    Stop,
}

/// Разделяемый контроллер состояния.
///
/// Клоны смотрят на одно и то же состояние; подписчики через
/// [`subscribe`](Self::subscribe) получают уведомления об изменениях.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    /// Можно ли публиковать в этом состоянии.
    pub fn can_publish(&self) -> bool {
        matches!(self, Self::Connected | Self::Running | Self::Paused)
    }

    /// Целевое состояние перехода или `None`, если переход недопустим.
    ///
    /// `start` в `running`, `pause` в `paused`, `resume` в `running` и
    /// `stop` в `stopped` ничего не меняют и не считаются ошибкой.
    pub fn next(
        self,
        transition: Transition,
    ) -> Option<LifecycleState> {
        use LifecycleState::*;
        use Transition::*;

        match (self, transition) {
            (_, Stop) => Some(Stopped),
            (Created, Connect) => Some(Connected),
            (Connected | Paused | Running, Start) => Some(Running),
            (Running | Paused, Pause) => Some(Paused),
            (Paused | Running, Resume) => Some(Running),
            _ => None,
        }
    }
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Created);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Применяет переход атомарно и возвращает новое состояние.
    ///
    /// При недопустимом переходе состояние не меняется.
    pub fn apply(
        &self,
        transition: Transition,
    ) -> Result<LifecycleState, LifecycleError> {
        let mut outcome = Err(LifecycleError::InvalidTransition {
            from: String::new(),
            action: transition.as_str().to_string(),
        });

        self.tx.send_if_modified(|state| match state.next(transition) {
            Some(next) => {
                outcome = Ok(next);
                let changed = *state != next;
                *state = next;
                changed
            }
            None => {
                outcome = Err(LifecycleError::InvalidTransition {
                    from: state.to_string(),
                    action: transition.as_str().to_string(),
                });
                false
            }
        });

        outcome
    }

    /// Приёмник уведомлений о смене состояния.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Ждёт, пока узел не окажется в состоянии `stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.subscribe();
        // Отправитель живёт вместе с `self`, поэтому ошибка невозможна
        let _ = rx.wait_for(|s| *s == LifecycleState::Stopped).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
