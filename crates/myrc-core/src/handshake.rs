//! Протокол установления соединения (handshake)
//!
//! Каждая сторона независимо выполняет:
//!
//! 1. Генерацию пары ключей выбранного алгоритма
//! 2. Отправку своего публичного ключа (один кадр)
//! 3. Приём публичного ключа собеседника (один кадр)
//! 4. Вычисление общего секрета
//! 5. Создание [`SecureChannel`]
//!
//! Роли клиента и сервера различаются только для логирования: формат и
//! порядок шагов одинаковы. Приватный ключ удаляется сразу после шага 4.

use bytes::Bytes;
use rand::rngs::OsRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::crypto::SecureChannel;
use crate::error::{HandshakeError, ProtocolError, Result};
use crate::frame::{read_frame, write_frame, FramedTransport};
use crate::kex::{
    EcDiffieHellman, KexAlgorithm, KeyExchange, ModOneDiffieHellman, PrimeDiffieHellman,
};

/// Состояние handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Ключи ещё не сгенерированы
    NotStarted,
    /// Публичный ключ сформирован и передаётся
    PublicKeySent,
    /// Ожидаем ключ собеседника
    AwaitingPeerKey,
    /// Общий секрет получен
    Complete,
}

/// Роль стороны соединения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Подключающаяся сторона
    Client,
    /// Принимающая сторона
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Handshake без ввода-вывода
pub struct Handshake<K: KeyExchange> {
    kex: K,
    role: Role,
    state: HandshakeState,
    private: Option<K::PrivateKey>,
}

impl<K: KeyExchange> Handshake<K> {
    /// Создать handshake для заданного алгоритма
    pub fn new(kex: K, role: Role) -> Self {
        Self {
            kex,
            role,
            state: HandshakeState::NotStarted,
            private: None,
        }
    }

    /// Текущее состояние
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Роль стороны
    pub fn role(&self) -> Role {
        self.role
    }

    /// Сгенерировать пару ключей и вернуть кадр с публичным ключом
    pub fn start<R: rand::RngCore + rand::CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<u8>> {
        self.expect_state(HandshakeState::NotStarted)?;

        let pair = self.kex.generate_keypair(rng);
        let frame = self.kex.serialize_public(&pair.public);
        self.private = Some(pair.private);
        self.state = HandshakeState::PublicKeySent;

        Ok(frame)
    }

    /// Отметить, что кадр с нашим ключом отправлен
    pub fn mark_sent(&mut self) -> Result<()> {
        self.expect_state(HandshakeState::PublicKeySent)?;
        self.state = HandshakeState::AwaitingPeerKey;
        Ok(())
    }

    /// Обработать ключ собеседника и получить зашифрованный канал
    pub fn finish(&mut self, peer_frame: &[u8]) -> Result<SecureChannel> {
        self.expect_state(HandshakeState::AwaitingPeerKey)?;

        let peer_public = self.kex.deserialize_public(peer_frame)?;
        let private = self
            .private
            .take()
            .ok_or_else(|| HandshakeError::InvalidState("приватный ключ отсутствует".into()))?;

        let secret = self.kex.combine(&private, &peer_public)?;
        drop(private);

        self.state = HandshakeState::Complete;
        Ok(SecureChannel::new(&secret))
    }

    fn expect_state(&self, expected: HandshakeState) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        if self.state == HandshakeState::Complete {
            return Err(HandshakeError::AlreadyCompleted.into());
        }
        Err(HandshakeError::InvalidState(format!(
            "ожидается {:?}, текущее {:?}",
            expected, self.state
        ))
        .into())
    }
}

/// Выполнить handshake поверх кадрированного транспорта
pub async fn perform_handshake<T, K>(
    transport: &mut FramedTransport<T>,
    kex: K,
    role: Role,
) -> Result<SecureChannel>
where
    T: AsyncRead + AsyncWrite + Unpin,
    K: KeyExchange,
{
    let mut handshake = Handshake::new(kex, role);

    let own_key = {
        let mut rng = OsRng;
        handshake.start(&mut rng)?
    };
    write_frame(transport, Bytes::from(own_key)).await?;
    handshake.mark_sent()?;
    debug!("[{}] Отправлен публичный ключ {}", handshake.role(), K::NAME);

    let peer_frame = read_frame(transport)
        .await?
        .ok_or(ProtocolError::UnexpectedClose("handshake"))?;
    debug!(
        "[{}] Получен публичный ключ ({} байт)",
        handshake.role(),
        peer_frame.len()
    );

    handshake.finish(&peer_frame).map_err(|e| {
        debug!("[{}] Ключ собеседника отклонён: {}", handshake.role(), e);
        e
    })
}

/// Выполнить handshake алгоритмом из конфигурации
pub async fn establish_channel<T>(
    transport: &mut FramedTransport<T>,
    algorithm: KexAlgorithm,
    role: Role,
) -> Result<SecureChannel>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match algorithm {
        KexAlgorithm::Modp => perform_handshake(transport, PrimeDiffieHellman::new(), role).await,
        KexAlgorithm::Ecdh => perform_handshake(transport, EcDiffieHellman::new(), role).await,
        KexAlgorithm::Irrational => {
            perform_handshake(transport, ModOneDiffieHellman::new(), role).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::frame::{framed, MAX_FRAME_SIZE};
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_full_handshake() {
        let mut rng = OsRng;

        let mut client = Handshake::new(EcDiffieHellman::new(), Role::Client);
        let mut server = Handshake::new(EcDiffieHellman::new(), Role::Server);
        assert_eq!(client.state(), HandshakeState::NotStarted);
        assert_eq!(client.role(), Role::Client);
        assert_eq!(server.role().to_string(), "server");

        let client_key = client.start(&mut rng).unwrap();
        let server_key = server.start(&mut rng).unwrap();
        assert_eq!(client.state(), HandshakeState::PublicKeySent);

        client.mark_sent().unwrap();
        server.mark_sent().unwrap();
        assert_eq!(server.state(), HandshakeState::AwaitingPeerKey);

        let client_channel = client.finish(&server_key).unwrap();
        let server_channel = server.finish(&client_key).unwrap();
        assert_eq!(client.state(), HandshakeState::Complete);
        assert_eq!(server.state(), HandshakeState::Complete);

        let ciphertext = client_channel.encrypt(b"Hello, MyRC!");
        let plaintext = server_channel.decrypt(&ciphertext).unwrap().unwrap();
        assert_eq!(plaintext, b"Hello, MyRC!");
    }

    #[test]
    fn test_not_reentrant() {
        let mut rng = OsRng;
        let mut client = Handshake::new(ModOneDiffieHellman::new(), Role::Client);
        let mut server = Handshake::new(ModOneDiffieHellman::new(), Role::Server);

        let client_key = client.start(&mut rng).unwrap();
        let server_key = server.start(&mut rng).unwrap();
        client.mark_sent().unwrap();
        client.finish(&server_key).unwrap();

        assert!(matches!(
            client.start(&mut rng),
            Err(ChatError::Handshake(HandshakeError::AlreadyCompleted))
        ));
        assert!(matches!(
            client.finish(&client_key),
            Err(ChatError::Handshake(HandshakeError::AlreadyCompleted))
        ));
    }

    #[test]
    fn test_finish_before_start() {
        let mut server = Handshake::new(PrimeDiffieHellman::new(), Role::Server);
        assert!(matches!(
            server.finish(b"{}"),
            Err(ChatError::Handshake(HandshakeError::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_handshake_over_transport_all_algorithms() {
        for algorithm in KexAlgorithm::ALL {
            let (a, b) = tokio::io::duplex(8192);
            let mut client_io = framed(a);
            let mut server_io = framed(b);

            let (client, server) = tokio::join!(
                establish_channel(&mut client_io, algorithm, Role::Client),
                establish_channel(&mut server_io, algorithm, Role::Server),
            );
            let client = client.unwrap();
            let server = server.unwrap();

            let ciphertext = server.encrypt_text("Enter username: ");
            assert_eq!(
                client.decrypt_text(&ciphertext).unwrap().as_deref(),
                Some("Enter username: ")
            );
        }
    }

    #[tokio::test]
    async fn test_algorithm_mismatch_is_protocol_error() {
        let (a, b) = tokio::io::duplex(8192);
        let mut client_io = framed(a);
        let mut server_io = framed(b);

        let (client, server) = tokio::join!(
            establish_channel(&mut client_io, KexAlgorithm::Ecdh, Role::Client),
            establish_channel(&mut server_io, KexAlgorithm::Modp, Role::Server),
        );

        assert!(matches!(
            server,
            Err(ChatError::Protocol(ProtocolError::AlgorithmMismatch { .. }))
        ));
        assert!(matches!(
            client,
            Err(ChatError::Protocol(ProtocolError::AlgorithmMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_oversized_peer_key() {
        let (mut a, b) = tokio::io::duplex(16384);
        let mut server_io = framed(b);

        a.write_u32((MAX_FRAME_SIZE * 2) as u32).await.unwrap();
        a.write_all(&vec![b'x'; MAX_FRAME_SIZE * 2]).await.unwrap();

        let result = establish_channel(&mut server_io, KexAlgorithm::Ecdh, Role::Server).await;
        assert!(matches!(
            result,
            Err(ChatError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_peer_closes_during_handshake() {
        let (a, b) = tokio::io::duplex(8192);
        let mut server_io = framed(b);

        let server = tokio::spawn(async move {
            establish_channel(&mut server_io, KexAlgorithm::Ecdh, Role::Server).await
        });

        // Клиент читает ключ сервера и закрывает соединение
        let mut client_io = framed(a);
        let _ = read_frame(&mut client_io).await.unwrap();
        drop(client_io);

        let result = server.await.unwrap();
        assert!(matches!(
            result,
            Err(ChatError::Protocol(ProtocolError::UnexpectedClose(_)))
        ));
    }
}
