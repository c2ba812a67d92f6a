//! Брокер для интеграционных тестов.
//!
//! Два порта: на `pub_port` узлы публикуют, на `sub_port` подписываются.
//! Сообщение доставляется каждому подписочному соединению, у которого
//! хотя бы один префикс совпадает с топиком, ровно один раз.

#![allow(dead_code)]

use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::BytesMut;
use extnode::{
    codec::{self, Multipart},
    network::wire::{encode_multipart, parse_subscription, MultipartDecoder, SubscriptionKind},
    Message, NodeConfig,
};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpSocket, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};

struct SubscriberEntry {
    id: u64,
    topics: Vec<String>,
    tx: mpsc::UnboundedSender<Multipart>,
}

#[derive(Default)]
struct BrokerState {
    subscribers: Mutex<Vec<SubscriberEntry>>,
    history: Mutex<Vec<Multipart>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

pub struct TestBroker {
    pub pub_port: u16,
    pub sub_port: u16,
    state: Arc<BrokerState>,
}

impl TestBroker {
    /// Запускает брокер на свободных портах.
    pub async fn start() -> TestBroker {
        let pub_listener = bind(0).await;
        let sub_listener = bind(0).await;
        let broker = TestBroker {
            pub_port: pub_listener.local_addr().unwrap().port(),
            sub_port: sub_listener.local_addr().unwrap().port(),
            state: Arc::new(BrokerState::default()),
        };
        broker.spawn_listeners(pub_listener, sub_listener);
        broker
    }

    /// Останавливает брокер: закрывает слушатели и все соединения.
    pub fn stop(&self) {
        for task in self.state.tasks.lock().drain(..) {
            task.abort();
        }
        self.state.subscribers.lock().clear();
    }

    /// Запускает брокер заново на тех же портах.
    pub async fn restart(&self) {
        self.restart_subscriber_side().await;
        self.restart_publisher_side().await;
    }

    /// Снова принимает подписочные соединения; публикации пока недоступны.
    pub async fn restart_subscriber_side(&self) {
        let listener = bind(self.sub_port).await;
        self.spawn_accept(listener, Role::Subscriber);
    }

    /// Снова принимает публикующие соединения.
    pub async fn restart_publisher_side(&self) {
        let listener = bind(self.pub_port).await;
        self.spawn_accept(listener, Role::Publisher);
    }

    /// Настройки узла для этого брокера с короткими таймаутами.
    pub fn node_config(
        &self,
        name: &str,
    ) -> NodeConfig {
        let mut cfg = NodeConfig::new(name).with_broker("127.0.0.1", self.sub_port, self.pub_port);
        cfg.receive_timeout_ms = 20;
        cfg.settle_ms = 100;
        cfg.connect_timeout_ms = 500;
        cfg.backoff_initial_ms = 20;
        cfg.backoff_max_ms = 200;
        cfg
    }

    /// Рассылает сообщение подписчикам так, будто его опубликовал узел.
    pub fn inject(
        &self,
        message: &Message,
    ) {
        route(&self.state, codec::encode(message));
    }

    /// Все сообщения, полученные брокером от публикующих узлов.
    pub fn published(&self) -> Vec<Message> {
        self.state
            .history
            .lock()
            .iter()
            .filter_map(|frames| codec::decode(frames).ok())
            .collect()
    }

    /// Число подписочных соединений, подписанных на префикс.
    pub fn subscribers_of(
        &self,
        topic: &str,
    ) -> usize {
        self.state
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.topics.iter().any(|t| t == topic))
            .count()
    }

    fn spawn_listeners(
        &self,
        pub_listener: TcpListener,
        sub_listener: TcpListener,
    ) {
        self.spawn_accept(pub_listener, Role::Publisher);
        self.spawn_accept(sub_listener, Role::Subscriber);
    }

    fn spawn_accept(
        &self,
        listener: TcpListener,
        role: Role,
    ) {
        let task = tokio::spawn(accept_loop(self.state.clone(), listener, role));
        self.state.tasks.lock().push(task);
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ждёт выполнения условия, опрашивая его каждые 10 мс.
pub async fn wait_until<F>(
    timeout: Duration,
    mut cond: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Ждёт завершения future не дольше `timeout`.
pub async fn within<F: Future>(
    timeout: Duration,
    fut: F,
) -> F::Output {
    tokio::time::timeout(timeout, fut)
        .await
        .expect("operation timed out")
}

#[derive(Clone, Copy)]
enum Role {
    Publisher,
    Subscriber,
}

async fn bind(port: u16) -> TcpListener {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_reuseaddr(true).unwrap();
    socket.bind(addr).unwrap();
    socket.listen(64).unwrap()
}

async fn accept_loop(
    state: Arc<BrokerState>,
    listener: TcpListener,
    role: Role,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let task = match role {
            Role::Publisher => tokio::spawn(serve_publisher(state.clone(), stream)),
            Role::Subscriber => tokio::spawn(serve_subscriber(state.clone(), stream)),
        };
        state.tasks.lock().push(task);
    }
}

async fn serve_publisher(
    state: Arc<BrokerState>,
    mut stream: TcpStream,
) {
    let mut buf = BytesMut::new();
    let mut decoder = MultipartDecoder::new();
    loop {
        match stream.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        while let Ok(Some(frames)) = decoder.decode(&mut buf) {
            state.history.lock().push(frames.clone());
            route(&state, frames);
        }
    }
}

async fn serve_subscriber(
    state: Arc<BrokerState>,
    mut stream: TcpStream,
) {
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.subscribers.lock().push(SubscriberEntry {
        id,
        topics: Vec::new(),
        tx,
    });

    let mut buf = BytesMut::new();
    let mut out = BytesMut::new();
    let mut decoder = MultipartDecoder::new();
    loop {
        tokio::select! {
            read = stream.read_buf(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                while let Ok(Some(frames)) = decoder.decode(&mut buf) {
                    let Some((kind, topic)) = frames.first().and_then(|f| parse_subscription(f)) else {
                        continue;
                    };
                    let topic = String::from_utf8_lossy(topic).to_string();
                    let mut subs = state.subscribers.lock();
                    let Some(entry) = subs.iter_mut().find(|s| s.id == id) else { continue };
                    match kind {
                        SubscriptionKind::Subscribe if !entry.topics.contains(&topic) => {
                            entry.topics.push(topic)
                        }
                        SubscriptionKind::Subscribe => {}
                        SubscriptionKind::Unsubscribe => entry.topics.retain(|t| *t != topic),
                    }
                }
            }
            frames = rx.recv() => {
                let Some(frames) = frames else { break };
                out.clear();
                encode_multipart(&frames, &mut out);
                if stream.write_all(&out).await.is_err() {
                    break;
                }
            }
        }
    }

    state.subscribers.lock().retain(|s| s.id != id);
}

fn route(
    state: &BrokerState,
    frames: Multipart,
) {
    let Some(topic) = frames.first() else { return };
    for sub in state.subscribers.lock().iter() {
        if sub.topics.iter().any(|t| topic.starts_with(t.as_bytes())) {
            let _ = sub.tx.send(frames.clone());
        }
    }
}
