//! Сессия одного клиента
//!
//! Жизненный цикл: `Connected → Handshaking → NegotiatingUsername → Active → Closed`.
//! Любая ошибка переводит сессию сразу в `Closed`. Закрытие возможно из
//! собственного цикла, по токену отмены из реестра или при остановке сервера,
//! запись в реестре удаляется ровно один раз.

use bytes::Bytes;
use myrc_core::{
    error::HandshakeError,
    frame::{framed, read_frame, write_frame, FramedTransport, MAX_PLAINTEXT_SIZE},
    handshake::{establish_channel, Role},
    ChatError, KexAlgorithm, Result, SecureChannel,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{ClientRegistry, ConnectionId, OUTBOUND_QUEUE_CAPACITY};
use crate::router::{RouteAction, Router};

/// Приглашение ввести имя
pub const USERNAME_PROMPT: &str = "Enter username: ";

/// Имя занято
pub const USERNAME_TAKEN: &str = "Username already taken. Try again.";

/// Имя пустое
pub const USERNAME_EMPTY: &str = "Username cannot be empty. Try again.";

/// Имя не помещается в уведомление о входе
pub const USERNAME_TOO_LONG: &str = "Username too long. Try again.";

/// Имя содержит управляющие символы
pub const USERNAME_INVALID: &str = "Username cannot contain control characters. Try again.";

const JOIN_SUFFIX: &str = " has joined the chat.";
const LEAVE_SUFFIX: &str = " has left the chat.";

/// Максимальная длина имени в байтах
///
/// Самая длинная строка, которую сервер собирает из имени, это уведомление
/// о входе; она обязана помещаться в один кадр.
pub const MAX_USERNAME_LEN: usize = MAX_PLAINTEXT_SIZE - JOIN_SUFFIX.len();

/// Причина отказа в имени; `None`, если имя допустимо
pub fn username_rejection(candidate: &str) -> Option<&'static str> {
    if candidate.is_empty() {
        Some(USERNAME_EMPTY)
    } else if candidate.len() > MAX_USERNAME_LEN {
        Some(USERNAME_TOO_LONG)
    } else if candidate.chars().any(char::is_control) {
        Some(USERNAME_INVALID)
    } else {
        None
    }
}

/// Состояние сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Соединение принято
    Connected,
    /// Идёт обмен ключами
    Handshaking,
    /// Канал установлен, ждём имя
    NegotiatingUsername,
    /// Имя закреплено, клиент в чате
    Active,
    /// Сессия завершена
    Closed,
}

/// Параметры сессии из конфигурации сервера
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Алгоритм обмена ключами
    pub algorithm: KexAlgorithm,
    /// Таймаут handshake
    pub handshake_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            algorithm: KexAlgorithm::default(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Сессия клиента
pub struct Session<T> {
    id: ConnectionId,
    addr: SocketAddr,
    transport: FramedTransport<T>,
    state: SessionState,
    registry: Arc<ClientRegistry>,
    router: Router,
    outbound: mpsc::Receiver<String>,
    shutdown: CancellationToken,
    settings: Arc<SessionSettings>,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Зарегистрировать соединение в реестре и создать сессию
    pub async fn register(
        io: T,
        addr: SocketAddr,
        registry: Arc<ClientRegistry>,
        settings: Arc<SessionSettings>,
    ) -> Self {
        let id = registry.next_connection_id();
        let (tx, outbound) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let shutdown = CancellationToken::new();

        registry.register_client(id, addr, tx, shutdown.clone()).await;

        Self {
            id,
            addr,
            transport: framed(io),
            state: SessionState::Connected,
            router: Router::new(Arc::clone(&registry)),
            registry,
            outbound,
            shutdown,
            settings,
        }
    }

    /// Идентификатор соединения
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Текущее состояние
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Обслуживать клиента до закрытия соединения
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let addr = self.addr;

        let result = tokio::select! {
            result = self.drive() => result,
            _ = shutdown.cancelled() => {
                debug!("[{}] Сессия отменена", addr);
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_disconnect() => debug!("[{}] Клиент отключился: {}", self.addr, e),
            Err(e) => warn!("[{}] Сессия завершена с ошибкой: {}", self.addr, e),
        }

        self.close().await;
    }

    async fn drive(&mut self) -> Result<()> {
        self.transition(SessionState::Handshaking);
        let channel = self.handshake().await?;

        self.transition(SessionState::NegotiatingUsername);
        let username = match self.negotiate_username(&channel).await? {
            Some(username) => username,
            None => return Ok(()),
        };

        self.transition(SessionState::Active);
        info!("[{}] Клиент вошёл в чат как '{}'", self.addr, username);
        self.send_text(&channel, &format!("Welcome {}!", username)).await?;
        self.registry
            .broadcast(self.id, &format!("{}{}", username, JOIN_SUFFIX))
            .await;

        self.message_loop(&channel, &username).await
    }

    async fn handshake(&mut self) -> Result<SecureChannel> {
        let timeout = self.settings.handshake_timeout;
        let algorithm = self.settings.algorithm;

        match tokio::time::timeout(
            timeout,
            establish_channel(&mut self.transport, algorithm, Role::Server),
        )
        .await
        {
            Ok(channel) => {
                let channel = channel?;
                debug!("[{}] Handshake завершён ({})", self.addr, algorithm);
                Ok(channel)
            }
            Err(_) => Err(HandshakeError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    /// Цикл согласования имени; `None`, если клиент ушёл
    async fn negotiate_username(&mut self, channel: &SecureChannel) -> Result<Option<String>> {
        loop {
            self.send_text(channel, USERNAME_PROMPT).await?;

            let candidate = match self.recv_text(channel).await? {
                Some(candidate) => candidate,
                None => return Ok(None),
            };
            let candidate = candidate.trim();

            if let Some(reason) = username_rejection(candidate) {
                debug!("[{}] Имя отклонено: {}", self.addr, reason);
                self.send_text(channel, reason).await?;
                continue;
            }

            match self.registry.claim_username(self.id, candidate).await {
                Ok(()) => return Ok(Some(candidate.to_string())),
                Err(ChatError::NegotiationConflict { username }) => {
                    debug!("[{}] Имя '{}' занято", self.addr, username);
                    self.send_text(channel, USERNAME_TAKEN).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn message_loop(&mut self, channel: &SecureChannel, username: &str) -> Result<()> {
        loop {
            tokio::select! {
                frame = read_frame(&mut self.transport) => {
                    let line = match frame? {
                        Some(frame) => match channel.decrypt_text(&frame)? {
                            Some(line) => line,
                            None => return Ok(()),
                        },
                        None => return Ok(()),
                    };

                    match self.router.route(self.id, username, &line).await {
                        RouteAction::Reply(text) => self.send_text(channel, &text).await?,
                        RouteAction::Quit => {
                            info!("[{}] '{}' покинул чат", self.addr, username);
                            // Имя освобождается до уведомления остальных
                            self.registry.unregister(self.id).await;
                            self.registry
                                .broadcast(self.id, &format!("{}{}", username, LEAVE_SUFFIX))
                                .await;
                            return Ok(());
                        }
                        RouteAction::Broadcast(_) | RouteAction::Ignore => {}
                    }
                }
                Some(text) = self.outbound.recv() => {
                    // Слишком длинная чужая строка пропускается, сессия живёт дальше
                    if text.len() > MAX_PLAINTEXT_SIZE {
                        warn!(
                            "[{}] Строка для '{}' не помещается в кадр ({} байт), пропущена",
                            self.addr,
                            username,
                            text.len()
                        );
                    } else {
                        self.send_text(channel, &text).await?;
                    }
                }
            }
        }
    }

    async fn send_text(&mut self, channel: &SecureChannel, text: &str) -> Result<()> {
        let ciphertext = channel.encrypt_text(text);
        write_frame(&mut self.transport, Bytes::from(ciphertext)).await
    }

    /// Следующая строка от клиента; `None` при закрытии потока или пустом кадре
    async fn recv_text(&mut self, channel: &SecureChannel) -> Result<Option<String>> {
        match read_frame(&mut self.transport).await? {
            Some(frame) => channel.decrypt_text(&frame),
            None => Ok(None),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("[{}] {:?} -> {:?}", self.addr, self.state, next);
        self.state = next;
    }

    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.transition(SessionState::Closed);

        self.registry.close(self.id).await;
        if let Err(e) = self.transport.get_mut().shutdown().await {
            debug!("[{}] Ошибка закрытия сокета: {}", self.addr, e);
        }

        info!("Соединение закрыто: {}", self.addr);
    }
}
