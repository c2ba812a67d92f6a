use std::{
    collections::BTreeSet,
    fmt, io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use extnode_error::{ConnectError, PublishError, WireError};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, watch, Notify},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, info, trace, warn};

use super::{
    backoff::Backoff,
    wire::{
        check_frame_lengths, encode_multipart, subscribe_frame, unsubscribe_frame,
        MultipartDecoder,
    },
};
use crate::codec::Multipart;

/// Сколько ждать завершения фоновых задач при закрытии.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Параметры транспортного соединения с брокером.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Адрес, куда подключается сокет публикации (`host:publisher_port`)
    pub publish_addr: String,
    /// Адрес, куда подключается сокет подписки (`host:subscriber_port`)
    pub subscribe_addr: String,
    /// Таймаут установления TCP-соединения и записи кадра
    pub connect_timeout: Duration,
    /// Начальная задержка переподключения
    pub backoff_initial: Duration,
    /// Верхняя граница задержки переподключения
    pub backoff_max: Duration,
    /// Ёмкость очереди исходящих сообщений
    pub publish_buffer: usize,
    /// Ёмкость очереди входящих сообщений
    pub inbound_buffer: usize,
}

/// Состояние транспорта.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Оба сокета подключены
    Connected,
    /// Хотя бы один сокет потерян, идёт переподключение
    Degraded,
    /// Соединение закрыто и больше не используется
    Closed,
}

/// Результат ожидания входящего сообщения.
#[derive(Debug, PartialEq)]
pub enum Received {
    /// Пришло сообщение
    Frames(Multipart),
    /// Истёк таймаут ожидания
    Timeout,
    /// Соединение закрыто
    Closed,
}

#[derive(Debug)]
enum Control {
    Subscribe(String),
    Unsubscribe(String),
}

/// Состояние, разделяемое между соединением и его фоновыми задачами.
#[derive(Debug, Default)]
struct Shared {
    topics: Mutex<BTreeSet<String>>,
    publisher_up: AtomicBool,
    subscriber_up: AtomicBool,
    closed: AtomicBool,
    pending: AtomicUsize,
    flushed: Notify,
}

/// Транспортное соединение с брокером.
///
/// Держит два TCP-сокета: исходящий для публикации и входящий для
/// подписок. Каждым сокетом владеет своя фоновая задача; при обрыве
/// задача переподключается с экспоненциальной задержкой и на входящем
/// сокете восстанавливает все подписки.
///
/// `send` не блокируется: кадр кладётся в ограниченную очередь, которую
/// вычитывает задача публикации. Ёмкость `publish_buffer` считает все
/// принятые и ещё не записанные сообщения, включая то, что задача
/// публикации держит до восстановления сокета. Сверх неё `send`
/// возвращает [`PublishError::Backpressure`].
pub struct Connection {
    options: ConnectOptions,
    outbound: mpsc::Sender<Multipart>,
    control: mpsc::UnboundedSender<Control>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Multipart>>,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Connection {
    /// Открывает оба сокета и запускает фоновые задачи.
    ///
    /// Возвращает [`ConnectError`], если брокер недоступен в момент вызова.
    /// Повторных попыток здесь нет.
    pub async fn connect(options: ConnectOptions) -> Result<Self, ConnectError> {
        debug!(
            publish = %options.publish_addr,
            subscribe = %options.subscribe_addr,
            "Connecting to broker"
        );

        let pub_stream = open_stream(&options.publish_addr, options.connect_timeout).await?;
        let sub_stream = open_stream(&options.subscribe_addr, options.connect_timeout).await?;

        let (outbound_tx, outbound_rx) = mpsc::channel(options.publish_buffer.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(options.inbound_buffer.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared::default());
        shared.publisher_up.store(true, Ordering::SeqCst);
        shared.subscriber_up.store(true, Ordering::SeqCst);

        let publisher = PublisherTask {
            addr: options.publish_addr.clone(),
            io_timeout: options.connect_timeout,
            backoff: Backoff::new(options.backoff_initial, options.backoff_max),
            shared: shared.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_tx.subscribe(),
        };
        let subscriber = SubscriberTask {
            addr: options.subscribe_addr.clone(),
            io_timeout: options.connect_timeout,
            backoff: Backoff::new(options.backoff_initial, options.backoff_max),
            shared: shared.clone(),
            control: control_rx,
            inbound: inbound_tx,
            shutdown: shutdown_tx.subscribe(),
        };

        let tasks = vec![
            tokio::spawn(publisher.run(pub_stream)),
            tokio::spawn(subscriber.run(sub_stream)),
        ];

        info!(
            publish = %options.publish_addr,
            subscribe = %options.subscribe_addr,
            "Connected to broker"
        );

        Ok(Self {
            options,
            outbound: outbound_tx,
            control: control_tx,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            shared,
            shutdown: shutdown_tx,
            tasks: Mutex::new(tasks),
        })
    }

    /// Ставит сообщение в очередь на отправку. Безопасно вызывать из
    /// нескольких задач одновременно и параллельно с [`receive`](Self::receive).
    ///
    /// Часть длиннее [`MAX_FRAME_LEN`](super::wire::MAX_FRAME_LEN) даёт
    /// [`PublishError::TooLarge`], сообщение не ставится в очередь.
    pub fn send(
        &self,
        frames: Multipart,
    ) -> Result<(), PublishError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(PublishError::NotConnected);
        }
        if let Err(WireError::FrameTooLarge { len, max }) = check_frame_lengths(&frames) {
            return Err(PublishError::TooLarge { len, max });
        }

        let capacity = self.options.publish_buffer;
        if self.shared.pending.fetch_add(1, Ordering::SeqCst) >= capacity {
            self.shared.frame_done();
            trace!(capacity, "Publish buffer full");
            return Err(PublishError::Backpressure { capacity });
        }
        match self.outbound.try_send(frames) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.shared.frame_done();
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        trace!(capacity = self.options.publish_buffer, "Publish buffer full");
                        Err(PublishError::Backpressure {
                            capacity: self.options.publish_buffer,
                        })
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(PublishError::NotConnected),
                }
            }
        }
    }

    /// Ждёт следующее входящее сообщение не дольше `wait`.
    ///
    /// Истечение таймаута не является ошибкой и возвращается как
    /// [`Received::Timeout`].
    pub async fn receive(
        &self,
        wait: Duration,
    ) -> Received {
        let mut inbound = self.inbound.lock().await;
        match timeout(wait, inbound.recv()).await {
            Ok(Some(frames)) => Received::Frames(frames),
            Ok(None) => Received::Closed,
            Err(_) => Received::Timeout,
        }
    }

    /// Подписывает входящий сокет на префикс топика.
    ///
    /// Повторная подписка на тот же префикс ничего не делает.
    pub fn subscribe_topic(
        &self,
        topic: &str,
    ) {
        if self.shared.topics.lock().insert(topic.to_string()) {
            let _ = self.control.send(Control::Subscribe(topic.to_string()));
        }
    }

    /// Снимает подписку входящего сокета с префикса топика.
    pub fn unsubscribe_topic(
        &self,
        topic: &str,
    ) {
        if self.shared.topics.lock().remove(topic) {
            let _ = self.control.send(Control::Unsubscribe(topic.to_string()));
        }
    }

    /// Префиксы, на которые подписан входящий сокет.
    pub fn topics(&self) -> Vec<String> {
        self.shared.topics.lock().iter().cloned().collect()
    }

    pub fn state(&self) -> TransportState {
        if self.shared.closed.load(Ordering::SeqCst) {
            TransportState::Closed
        } else if self.shared.publisher_up.load(Ordering::SeqCst)
            && self.shared.subscriber_up.load(Ordering::SeqCst)
        {
            TransportState::Connected
        } else {
            TransportState::Degraded
        }
    }

    /// Число принятых, но ещё не записанных в сокет сообщений.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Ждёт, пока все принятые сообщения будут записаны в сокет.
    ///
    /// Возвращает `false`, если за `wait` очередь не опустела.
    pub async fn flush(
        &self,
        wait: Duration,
    ) -> bool {
        let drained = async {
            loop {
                let notified = self.shared.flushed.notified();
                if self.pending() == 0 {
                    return;
                }
                notified.await;
            }
        };
        timeout(wait, drained).await.is_ok()
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Закрывает соединение и дожидается фоновых задач.
    ///
    /// Перед выходом задача публикации старается дописать очередь.
    /// Повторный вызов ничего не делает.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for mut task in tasks {
            if timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!("Transport task did not stop in time, aborting");
                task.abort();
            }
        }
        info!(publish = %self.options.publish_addr, "Connection closed");
    }
}

impl Shared {
    fn frame_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.flushed.notify_waiters();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
    }
}

impl fmt::Debug for Connection {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Connection")
            .field("publish_addr", &self.options.publish_addr)
            .field("subscribe_addr", &self.options.subscribe_addr)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Фоновые задачи
////////////////////////////////////////////////////////////////////////////////

enum PublisherEvent {
    Shutdown,
    Frame(Multipart),
    Disconnected(io::Error),
    Ignored,
}

struct PublisherTask {
    addr: String,
    io_timeout: Duration,
    backoff: Backoff,
    shared: Arc<Shared>,
    outbound: mpsc::Receiver<Multipart>,
    shutdown: watch::Receiver<bool>,
}

impl PublisherTask {
    async fn run(
        mut self,
        stream: TcpStream,
    ) {
        let mut stream = Some(stream);
        let mut pending: Option<Multipart> = None;
        let mut buf = BytesMut::with_capacity(4096);
        let mut discard = [0u8; 64];

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let Some(sock) = stream.as_mut() else {
                self.shared.publisher_up.store(false, Ordering::SeqCst);
                match reconnect(&self.addr, self.io_timeout, &mut self.backoff, &mut self.shutdown)
                    .await
                {
                    Some(sock) => {
                        self.shared.publisher_up.store(true, Ordering::SeqCst);
                        stream = Some(sock);
                        continue;
                    }
                    None => break,
                }
            };

            // Кадр, который не удалось записать до обрыва, уходит первым
            if let Some(frames) = pending.take() {
                match write_multipart(sock, &frames, &mut buf, self.io_timeout).await {
                    Ok(()) => self.shared.frame_done(),
                    Err(e) => {
                        warn!(addr = %self.addr, error = %WireError::from(e), "Publish socket lost");
                        pending = Some(frames);
                        stream = None;
                    }
                }
                continue;
            }

            let event = tokio::select! {
                biased;
                _ = self.shutdown.changed() => PublisherEvent::Shutdown,
                frame = self.outbound.recv() => match frame {
                    Some(frames) => PublisherEvent::Frame(frames),
                    None => PublisherEvent::Shutdown,
                },
                read = sock.read(&mut discard) => match read {
                    Ok(0) => PublisherEvent::Disconnected(io::ErrorKind::UnexpectedEof.into()),
                    Ok(_) => PublisherEvent::Ignored,
                    Err(e) => PublisherEvent::Disconnected(e),
                },
            };

            match event {
                PublisherEvent::Shutdown => break,
                PublisherEvent::Frame(frames) => pending = Some(frames),
                PublisherEvent::Disconnected(e) => {
                    warn!(addr = %self.addr, error = %WireError::from(e), "Publish socket lost");
                    stream = None;
                }
                PublisherEvent::Ignored => {}
            }
        }

        self.drain(stream, pending, &mut buf).await;
        self.shared.publisher_up.store(false, Ordering::SeqCst);
        debug!(addr = %self.addr, "Publisher task stopped");
    }

    /// Дописывает оставшуюся очередь перед закрытием.
    async fn drain(
        &mut self,
        mut stream: Option<TcpStream>,
        mut pending: Option<Multipart>,
        buf: &mut BytesMut,
    ) {
        self.outbound.close();
        loop {
            let frames = match pending.take() {
                Some(frames) => frames,
                None => match self.outbound.try_recv() {
                    Ok(frames) => frames,
                    Err(_) => break,
                },
            };
            if let Some(sock) = stream.as_mut() {
                if let Err(e) = write_multipart(sock, &frames, buf, self.io_timeout).await {
                    debug!(error = %e, "Dropping queued frames on close");
                    stream = None;
                }
            }
            self.shared.frame_done();
        }

        if let Some(mut sock) = stream {
            let _ = sock.shutdown().await;
        }
    }
}

enum SubscriberEvent {
    Shutdown,
    Control(Control),
    Read(io::Result<usize>),
}

struct SubscriberTask {
    addr: String,
    io_timeout: Duration,
    backoff: Backoff,
    shared: Arc<Shared>,
    control: mpsc::UnboundedReceiver<Control>,
    inbound: mpsc::Sender<Multipart>,
    shutdown: watch::Receiver<bool>,
}

impl SubscriberTask {
    async fn run(
        mut self,
        stream: TcpStream,
    ) {
        let mut stream = Some(stream);
        let mut decoder = MultipartDecoder::new();
        let mut read_buf = BytesMut::with_capacity(8192);
        let mut write_buf = BytesMut::with_capacity(256);

        'outer: loop {
            if *self.shutdown.borrow() {
                break;
            }

            let Some(sock) = stream.as_mut() else {
                self.shared.subscriber_up.store(false, Ordering::SeqCst);
                let Some(mut sock) =
                    reconnect(&self.addr, self.io_timeout, &mut self.backoff, &mut self.shutdown)
                        .await
                else {
                    break;
                };

                // Набор топиков уже отражает все команды из очереди
                while self.control.try_recv().is_ok() {}
                decoder.reset();
                read_buf.clear();

                let topics: Vec<String> = self.shared.topics.lock().iter().cloned().collect();
                let mut restored = true;
                for topic in &topics {
                    let frame = [subscribe_frame(topic)];
                    if let Err(e) =
                        write_multipart(&mut sock, &frame, &mut write_buf, self.io_timeout).await
                    {
                        warn!(addr = %self.addr, error = %e, "Failed to restore subscriptions");
                        restored = false;
                        break;
                    }
                }
                if restored {
                    info!(addr = %self.addr, topics = topics.len(), "Subscriptions restored");
                    self.shared.subscriber_up.store(true, Ordering::SeqCst);
                    stream = Some(sock);
                }
                continue;
            };

            let event = tokio::select! {
                biased;
                _ = self.shutdown.changed() => SubscriberEvent::Shutdown,
                cmd = self.control.recv() => match cmd {
                    Some(cmd) => SubscriberEvent::Control(cmd),
                    None => SubscriberEvent::Shutdown,
                },
                read = sock.read_buf(&mut read_buf) => SubscriberEvent::Read(read),
            };

            match event {
                SubscriberEvent::Shutdown => break,
                SubscriberEvent::Control(cmd) => {
                    let (frame, topic) = match &cmd {
                        Control::Subscribe(t) => (subscribe_frame(t), t),
                        Control::Unsubscribe(t) => (unsubscribe_frame(t), t),
                    };
                    trace!(?cmd, "Sending subscription command");
                    if let Err(e) =
                        write_multipart(sock, &[frame], &mut write_buf, self.io_timeout).await
                    {
                        warn!(addr = %self.addr, topic = %topic, error = %e, "Subscribe socket lost");
                        stream = None;
                    }
                }
                SubscriberEvent::Read(Ok(0)) => {
                    warn!(addr = %self.addr, "Subscribe socket closed by broker");
                    stream = None;
                }
                SubscriberEvent::Read(Err(e)) => {
                    warn!(addr = %self.addr, error = %WireError::from(e), "Subscribe socket lost");
                    stream = None;
                }
                SubscriberEvent::Read(Ok(_)) => loop {
                    match decoder.decode(&mut read_buf) {
                        Ok(Some(frames)) => {
                            let delivered = tokio::select! {
                                _ = self.shutdown.changed() => break 'outer,
                                sent = self.inbound.send(frames) => sent.is_ok(),
                            };
                            if !delivered {
                                break 'outer;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(addr = %self.addr, error = %e, "Corrupted stream, reconnecting");
                            stream = None;
                            break;
                        }
                    }
                },
            }
        }

        self.shared.subscriber_up.store(false, Ordering::SeqCst);
        debug!(addr = %self.addr, "Subscriber task stopped");
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние функции
////////////////////////////////////////////////////////////////////////////////

async fn open_stream(
    addr: &str,
    connect_timeout: Duration,
) -> Result<TcpStream, ConnectError> {
    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ConnectError::Timeout {
            address: addr.to_string(),
        })?
        .map_err(|e| ConnectError::Unreachable {
            address: addr.to_string(),
            reason: e.to_string(),
        })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Переподключается с экспоненциальной задержкой.
///
/// Возвращает `None`, если во время ожидания пришёл сигнал остановки.
async fn reconnect(
    addr: &str,
    connect_timeout: Duration,
    backoff: &mut Backoff,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<TcpStream> {
    loop {
        let delay = backoff.next_delay();
        trace!(addr, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        tokio::select! {
            _ = shutdown.changed() => return None,
            _ = sleep(delay) => {}
        }
        if *shutdown.borrow() {
            return None;
        }

        match open_stream(addr, connect_timeout).await {
            Ok(stream) => {
                backoff.reset();
                info!(addr, "Reconnected to broker");
                return Some(stream);
            }
            Err(e) => debug!(addr, error = %e, "Reconnect attempt failed"),
        }
    }
}

async fn write_multipart(
    stream: &mut TcpStream,
    frames: &[Bytes],
    buf: &mut BytesMut,
    write_timeout: Duration,
) -> io::Result<()> {
    buf.clear();
    encode_multipart(frames, buf);
    match timeout(write_timeout, stream.write_all(buf)).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::network::wire::MAX_FRAME_LEN;

    fn options(
        publish_addr: String,
        subscribe_addr: String,
        publish_buffer: usize,
    ) -> ConnectOptions {
        ConnectOptions {
            publish_addr,
            subscribe_addr,
            connect_timeout: Duration::from_secs(1),
            backoff_initial: Duration::from_millis(20),
            backoff_max: Duration::from_millis(200),
            publish_buffer,
            inbound_buffer: 16,
        }
    }

    /// Принимает по одному соединению на каждый порт и возвращает сокеты.
    async fn pair() -> (TcpListener, TcpListener) {
        (
            TcpListener::bind("127.0.0.1:0").await.unwrap(),
            TcpListener::bind("127.0.0.1:0").await.unwrap(),
        )
    }

    /// Тест проверяет ConnectError при недоступном брокере.
    #[tokio::test]
    async fn test_connect_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = Connection::connect(options(addr.clone(), addr, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Unreachable { .. }));
    }

    /// Тест проверяет, что отправленный кадр доходит до сокета публикации.
    #[tokio::test]
    async fn test_send_reaches_socket() {
        let (pub_l, sub_l) = pair().await;
        let opts = options(
            pub_l.local_addr().unwrap().to_string(),
            sub_l.local_addr().unwrap().to_string(),
            4,
        );

        let conn = Connection::connect(opts).await.unwrap();
        let (mut pub_sock, _) = pub_l.accept().await.unwrap();
        let (_sub_sock, _) = sub_l.accept().await.unwrap();

        conn.send(vec![Bytes::from_static(b"t"), Bytes::from_static(b"{}")])
            .unwrap();
        assert!(conn.flush(Duration::from_secs(1)).await);

        let mut buf = BytesMut::new();
        let mut decoder = MultipartDecoder::new();
        let frames = loop {
            pub_sock.read_buf(&mut buf).await.unwrap();
            if let Some(frames) = decoder.decode(&mut buf).unwrap() {
                break frames;
            }
        };
        assert_eq!(frames, vec![Bytes::from_static(b"t"), Bytes::from_static(b"{}")]);

        conn.close().await;
        assert_eq!(conn.state(), TransportState::Closed);
        assert_eq!(
            conn.send(vec![Bytes::from_static(b"t")]),
            Err(PublishError::NotConnected)
        );
    }

    /// Тест проверяет отправку кадра подписки и приём сообщений.
    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let (pub_l, sub_l) = pair().await;
        let opts = options(
            pub_l.local_addr().unwrap().to_string(),
            sub_l.local_addr().unwrap().to_string(),
            4,
        );

        let conn = Connection::connect(opts).await.unwrap();
        let (_pub_sock, _) = pub_l.accept().await.unwrap();
        let (mut sub_sock, _) = sub_l.accept().await.unwrap();

        conn.subscribe_topic("a/b");
        conn.subscribe_topic("a/b");
        assert_eq!(conn.topics(), vec!["a/b".to_string()]);

        let mut buf = BytesMut::new();
        let mut decoder = MultipartDecoder::new();
        let frames = loop {
            sub_sock.read_buf(&mut buf).await.unwrap();
            if let Some(frames) = decoder.decode(&mut buf).unwrap() {
                break frames;
            }
        };
        assert_eq!(frames, vec![subscribe_frame("a/b")]);

        let mut out = BytesMut::new();
        encode_multipart(
            &[Bytes::from_static(b"a/b/c"), Bytes::from_static(b"1")],
            &mut out,
        );
        sub_sock.write_all(&out).await.unwrap();

        assert_eq!(
            conn.receive(Duration::from_secs(1)).await,
            Received::Frames(vec![Bytes::from_static(b"a/b/c"), Bytes::from_static(b"1")])
        );
        assert_eq!(
            conn.receive(Duration::from_millis(20)).await,
            Received::Timeout
        );

        conn.close().await;
    }

    /// Тест проверяет Backpressure при потерянном сокете публикации.
    #[tokio::test]
    async fn test_backpressure_while_degraded() {
        let (pub_l, sub_l) = pair().await;
        let opts = options(
            pub_l.local_addr().unwrap().to_string(),
            sub_l.local_addr().unwrap().to_string(),
            2,
        );

        let conn = Connection::connect(opts).await.unwrap();
        let (pub_sock, _) = pub_l.accept().await.unwrap();
        let (_sub_sock, _) = sub_l.accept().await.unwrap();
        drop(pub_l);
        drop(pub_sock);

        for _ in 0..100 {
            if conn.state() == TransportState::Degraded {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(conn.state(), TransportState::Degraded);

        let frame = || vec![Bytes::from_static(b"t"), Bytes::from_static(b"{}")];
        assert!(conn.send(frame()).is_ok());
        assert!(conn.send(frame()).is_ok());
        assert_eq!(
            conn.send(frame()),
            Err(PublishError::Backpressure { capacity: 2 })
        );
        assert_eq!(conn.pending(), 2);
        assert!(!conn.flush(Duration::from_millis(50)).await);

        conn.close().await;
    }

    /// Тест проверяет отказ на части длиннее одного кадра: сообщение не
    /// попадает в очередь, а соединение продолжает работать.
    #[tokio::test]
    async fn test_send_rejects_oversized_part() {
        let (pub_l, sub_l) = pair().await;
        let opts = options(
            pub_l.local_addr().unwrap().to_string(),
            sub_l.local_addr().unwrap().to_string(),
            4,
        );

        let conn = Connection::connect(opts).await.unwrap();
        let (mut pub_sock, _) = pub_l.accept().await.unwrap();
        let (_sub_sock, _) = sub_l.accept().await.unwrap();

        let oversized = vec![
            Bytes::from_static(b"t"),
            Bytes::from(vec![b'x'; MAX_FRAME_LEN + 1]),
        ];
        assert_eq!(
            conn.send(oversized),
            Err(PublishError::TooLarge {
                len: MAX_FRAME_LEN + 1,
                max: MAX_FRAME_LEN,
            })
        );
        assert_eq!(conn.pending(), 0);

        conn.send(vec![Bytes::from_static(b"t"), Bytes::from_static(b"ok")])
            .unwrap();
        let mut buf = BytesMut::new();
        let mut decoder = MultipartDecoder::new();
        let frames = loop {
            pub_sock.read_buf(&mut buf).await.unwrap();
            if let Some(frames) = decoder.decode(&mut buf).unwrap() {
                break frames;
            }
        };
        assert_eq!(frames[1], Bytes::from_static(b"ok"));

        conn.close().await;
    }

    /// Тест проверяет, что сообщение, которое задача публикации уже
    /// забрала из очереди, но не дописала, занимает место в ёмкости.
    #[tokio::test]
    async fn test_capacity_counts_unwritten_message() {
        let (pub_l, sub_l) = pair().await;
        let opts = options(
            pub_l.local_addr().unwrap().to_string(),
            sub_l.local_addr().unwrap().to_string(),
            1,
        );

        let conn = Connection::connect(opts).await.unwrap();
        // Сокет публикации принят, но не читается: большая запись зависает
        let (_pub_sock, _) = pub_l.accept().await.unwrap();
        let (_sub_sock, _) = sub_l.accept().await.unwrap();

        let big = vec![Bytes::from_static(b"t"), Bytes::from(vec![0u8; MAX_FRAME_LEN])];
        conn.send(big).unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(conn.pending(), 1);
        assert_eq!(
            conn.send(vec![Bytes::from_static(b"t"), Bytes::from_static(b"{}")]),
            Err(PublishError::Backpressure { capacity: 1 })
        );

        conn.close().await;
    }
}
