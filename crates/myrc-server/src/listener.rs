//! TCP Listener для принятия подключений клиентов
//!
//! Этот модуль отвечает за:
//! - Прослушивание TCP порта
//! - Ограничение числа одновременных подключений
//! - Запуск отдельной задачи на каждое соединение

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::registry::ClientRegistry;
use crate::session::{Session, SessionSettings};

/// TCP Listener сервера
pub struct ChatListener {
    /// Сокет
    listener: TcpListener,
    /// Реестр клиентов
    registry: Arc<ClientRegistry>,
    /// Параметры новых сессий
    settings: Arc<SessionSettings>,
    /// Максимум одновременных подключений
    max_connections: usize,
}

impl ChatListener {
    /// Создать listener по конфигурации
    pub async fn bind(config: &ServerConfig, registry: Arc<ClientRegistry>) -> std::io::Result<Self> {
        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(bind_addr).await?;

        info!("MyRC сервер запущен на {} (TCP)", listener.local_addr()?);

        Ok(Self {
            listener,
            registry,
            settings: Arc::new(SessionSettings {
                algorithm: config.security.key_exchange,
                handshake_timeout: config.handshake_timeout(),
            }),
            max_connections: config.network.max_connections,
        })
    }

    /// Фактический адрес (полезно при порте 0)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Запустить listener (основной цикл)
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => self.accept_client(stream, peer_addr).await,
                Err(e) => {
                    error!("Ошибка приёма подключения: {}", e);
                }
            }
        }
    }

    async fn accept_client(&self, stream: TcpStream, peer_addr: SocketAddr) {
        if self.registry.connection_count().await >= self.max_connections {
            warn!(
                "Превышен лимит подключений ({}), отклонён {}",
                self.max_connections, peer_addr
            );
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Не удалось включить TCP_NODELAY для {}: {}", peer_addr, e);
        }

        info!(
            "Новое подключение: {} (в чате: {})",
            peer_addr,
            self.registry.active_count().await
        );

        let session = Session::register(
            stream,
            peer_addr,
            Arc::clone(&self.registry),
            Arc::clone(&self.settings),
        )
        .await;

        tokio::spawn(session.run());
    }
}
