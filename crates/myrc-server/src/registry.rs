//! Реестр подключённых клиентов
//!
//! Этот модуль отвечает за:
//! - Регистрацию соединений и их исходящих очередей
//! - Атомарное закрепление имён пользователей
//! - Рассылку сообщений активным клиентам
//! - Закрытие соединений извне (по команде или при остановке сервера)

use myrc_core::{ChatError, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Идентификатор соединения
pub type ConnectionId = u64;

/// Ёмкость исходящей очереди одной сессии
///
/// Клиенту, который перестал читать, новые строки не ставятся в очередь
/// сверх этого предела, а отбрасываются.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Запись о клиенте
struct ClientEntry {
    addr: SocketAddr,
    /// `None`, пока имя не согласовано
    username: Option<String>,
    tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

/// Сведения об удалённой записи
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedClient {
    /// Адрес клиента
    pub addr: SocketAddr,
    /// Имя, если сессия успела стать активной
    pub username: Option<String>,
}

/// Реестр активных клиентов
pub struct ClientRegistry {
    clients: RwLock<HashMap<ConnectionId, ClientEntry>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    /// Создать новый реестр
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Выдать идентификатор для нового соединения
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Зарегистрировать соединение до согласования имени
    pub async fn register_client(
        &self,
        id: ConnectionId,
        addr: SocketAddr,
        tx: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) {
        let mut clients = self.clients.write().await;
        let previous = clients.insert(
            id,
            ClientEntry {
                addr,
                username: None,
                tx,
                shutdown,
            },
        );

        if let Some(previous) = previous {
            warn!("Повторная регистрация соединения {} ({})", id, previous.addr);
            previous.shutdown.cancel();
        }
        debug!("Клиент зарегистрирован: id = {}, addr = {}", id, addr);
    }

    /// Закрепить имя за соединением
    ///
    /// Проверка и запись выполняются под одной блокировкой, поэтому из
    /// нескольких одновременных заявок на одно имя успешна ровно одна.
    pub async fn claim_username(&self, id: ConnectionId, username: &str) -> Result<()> {
        let mut clients = self.clients.write().await;

        let taken = clients
            .iter()
            .any(|(other, entry)| *other != id && entry.username.as_deref() == Some(username));
        if taken {
            return Err(ChatError::NegotiationConflict {
                username: username.to_string(),
            });
        }

        let entry = clients.get_mut(&id).ok_or_else(|| {
            ChatError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "соединение уже закрыто",
            ))
        })?;
        entry.username = Some(username.to_string());

        debug!("Имя '{}' закреплено за соединением {}", username, id);
        Ok(())
    }

    /// Удалить запись, не отменяя задачу сессии
    ///
    /// Повторный вызов для того же соединения возвращает `None`.
    pub async fn unregister(&self, id: ConnectionId) -> Option<RemovedClient> {
        self.remove(id).await.map(|entry| RemovedClient {
            addr: entry.addr,
            username: entry.username,
        })
    }

    /// Удалить запись и отменить задачу сессии
    ///
    /// Повторный вызов для того же соединения возвращает `None`.
    pub async fn close(&self, id: ConnectionId) -> Option<RemovedClient> {
        let entry = self.remove(id).await?;
        entry.shutdown.cancel();

        Some(RemovedClient {
            addr: entry.addr,
            username: entry.username,
        })
    }

    async fn remove(&self, id: ConnectionId) -> Option<ClientEntry> {
        let entry = {
            let mut clients = self.clients.write().await;
            clients.remove(&id)?
        };
        debug!("Клиент удалён из реестра: id = {}, addr = {}", id, entry.addr);
        Some(entry)
    }

    /// Закрыть все соединения
    pub async fn close_all(&self) -> usize {
        let entries: Vec<ClientEntry> = {
            let mut clients = self.clients.write().await;
            clients.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &entries {
            entry.shutdown.cancel();
        }
        entries.len()
    }

    /// Имена активных клиентов по алфавиту
    pub async fn usernames(&self) -> Vec<String> {
        let clients = self.clients.read().await;
        let mut names: Vec<String> = clients
            .values()
            .filter_map(|entry| entry.username.clone())
            .collect();
        names.sort();
        names
    }

    /// Разослать текст всем активным клиентам, кроме отправителя
    ///
    /// Очереди копируются под блокировкой чтения, отправка идёт после её
    /// освобождения и никогда не ждёт получателя. Закрытые очереди
    /// пропускаются, в переполненной очереди строка отбрасывается.
    pub async fn broadcast(&self, from: ConnectionId, text: &str) -> usize {
        let targets: Vec<(ConnectionId, mpsc::Sender<String>)> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(id, entry)| **id != from && entry.username.is_some())
                .map(|(id, entry)| (*id, entry.tx.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(text.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Очередь соединения {} переполнена, строка отброшена", id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Очередь соединения {} закрыта, пропускаем", id);
                }
            }
        }
        delivered
    }

    /// Количество клиентов с согласованным именем
    pub async fn active_count(&self) -> usize {
        let clients = self.clients.read().await;
        clients.values().filter(|entry| entry.username.is_some()).count()
    }

    /// Количество соединений, включая ещё не представившиеся
    pub async fn connection_count(&self) -> usize {
        let clients = self.clients.read().await;
        clients.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    async fn register(
        registry: &ClientRegistry,
        port: u16,
    ) -> (ConnectionId, mpsc::Receiver<String>, CancellationToken) {
        let id = registry.next_connection_id();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let token = CancellationToken::new();
        registry.register_client(id, addr(port), tx, token.clone()).await;
        (id, rx, token)
    }

    #[tokio::test]
    async fn test_client_registry() {
        let registry = ClientRegistry::new();
        let (id, _rx, _token) = register(&registry, 5000).await;

        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.active_count().await, 0);

        registry.claim_username(id, "alice").await.unwrap();
        assert_eq!(registry.active_count().await, 1);

        let removed = registry.close(id).await.unwrap();
        assert_eq!(removed.username.as_deref(), Some("alice"));
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_username_conflict() {
        let registry = ClientRegistry::new();
        let (alice, _rx1, _t1) = register(&registry, 5001).await;
        let (other, _rx2, _t2) = register(&registry, 5002).await;

        registry.claim_username(alice, "alice").await.unwrap();

        let result = registry.claim_username(other, "alice").await;
        assert!(matches!(
            result,
            Err(ChatError::NegotiationConflict { ref username }) if username == "alice"
        ));

        registry.claim_username(other, "alice2").await.unwrap();
        assert_eq!(registry.usernames().await, vec!["alice", "alice2"]);
    }

    #[tokio::test]
    async fn test_name_released_after_close() {
        let registry = ClientRegistry::new();
        let (first, _rx1, _t1) = register(&registry, 5003).await;
        let (second, _rx2, _t2) = register(&registry, 5004).await;

        registry.claim_username(first, "bob").await.unwrap();
        registry.close(first).await;

        registry.claim_username(second, "bob").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_claims_single_winner() {
        let registry = Arc::new(ClientRegistry::new());
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for port in 0..32 {
            let (id, rx, token) = register(&registry, 6000 + port).await;
            ids.push(id);
            receivers.push((rx, token));
        }

        let tasks: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.claim_username(id, "alice").await.is_ok() })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(registry.usernames().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = ClientRegistry::new();
        let (alice, mut alice_rx, _t1) = register(&registry, 5005).await;
        let (bob, mut bob_rx, _t2) = register(&registry, 5006).await;
        let (_pending, mut pending_rx, _t3) = register(&registry, 5007).await;

        registry.claim_username(alice, "alice").await.unwrap();
        registry.claim_username(bob, "bob").await.unwrap();

        let delivered = registry.broadcast(alice, "alice: hi").await;
        assert_eq!(delivered, 1);
        assert_eq!(bob_rx.recv().await.as_deref(), Some("alice: hi"));
        assert!(alice_rx.try_recv().is_err());
        // Не представившиеся клиенты рассылку не получают
        assert!(pending_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_stale_entries() {
        let registry = ClientRegistry::new();
        let (alice, _alice_rx, _t1) = register(&registry, 5008).await;
        let (bob, bob_rx, _t2) = register(&registry, 5009).await;
        let (carol, mut carol_rx, _t3) = register(&registry, 5010).await;

        registry.claim_username(alice, "alice").await.unwrap();
        registry.claim_username(bob, "bob").await.unwrap();
        registry.claim_username(carol, "carol").await.unwrap();

        // Сессия bob завершилась, но запись ещё не удалена
        drop(bob_rx);

        let delivered = registry.broadcast(alice, "alice: hi").await;
        assert_eq!(delivered, 1);
        assert_eq!(carol_rx.recv().await.as_deref(), Some("alice: hi"));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let registry = ClientRegistry::new();
        let (alice, _alice_rx, _t1) = register(&registry, 5017).await;
        let (bob, mut bob_rx, _t2) = register(&registry, 5018).await;
        let (carol, mut carol_rx, _t3) = register(&registry, 5019).await;

        registry.claim_username(alice, "alice").await.unwrap();
        registry.claim_username(bob, "bob").await.unwrap();
        registry.claim_username(carol, "carol").await.unwrap();

        // bob не читает; carol вычитывает очередь
        for i in 0..OUTBOUND_QUEUE_CAPACITY {
            assert_eq!(registry.broadcast(alice, &format!("alice: {}", i)).await, 2);
            assert!(carol_rx.recv().await.is_some());
        }

        // Очередь bob заполнена: строка для него отброшена, carol её получает
        let delivered = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            registry.broadcast(alice, "alice: overflow"),
        )
        .await
        .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(carol_rx.recv().await.as_deref(), Some("alice: overflow"));

        assert_eq!(bob_rx.recv().await.as_deref(), Some("alice: 0"));
        let mut last = None;
        while let Ok(line) = bob_rx.try_recv() {
            last = Some(line);
        }
        assert_eq!(
            last,
            Some(format!("alice: {}", OUTBOUND_QUEUE_CAPACITY - 1))
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let registry = ClientRegistry::new();
        let (id, _rx, token) = register(&registry, 5011).await;

        assert!(registry.close(id).await.is_some());
        assert!(token.is_cancelled());
        assert!(registry.close(id).await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_keeps_session_running() {
        let registry = ClientRegistry::new();
        let (id, _rx, token) = register(&registry, 5016).await;
        registry.claim_username(id, "alice").await.unwrap();

        let removed = registry.unregister(id).await.unwrap();
        assert_eq!(removed.addr, addr(5016));
        assert!(!token.is_cancelled());
        assert!(registry.usernames().await.is_empty());
        assert!(registry.close(id).await.is_none());
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = ClientRegistry::new();
        let (_a, _rx1, t1) = register(&registry, 5012).await;
        let (_b, _rx2, t2) = register(&registry, 5013).await;

        assert_eq!(registry.close_all().await, 2);
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_claim_after_close_fails() {
        let registry = ClientRegistry::new();
        let (id, _rx, _token) = register(&registry, 5014).await;
        registry.close(id).await;

        let result = registry.claim_username(id, "ghost").await;
        assert!(matches!(result, Err(ChatError::Transport(_))));
    }
}
