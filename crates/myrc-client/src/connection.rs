//! Подключение к серверу чата
//!
//! Этот модуль отвечает за:
//! - Установление TCP подключения к серверу
//! - Выполнение handshake выбранным алгоритмом
//! - Отправку и получение зашифрованных строк

use bytes::Bytes;
use myrc_core::{
    frame::{framed, read_frame, write_frame, FramedTransport},
    handshake::{establish_channel, Role},
    ChatError, KexAlgorithm, Result, SecureChannel,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

/// Зашифрованное подключение к серверу
pub struct ChatConnection<T = TcpStream> {
    transport: FramedTransport<T>,
    channel: SecureChannel,
    algorithm: KexAlgorithm,
}

impl ChatConnection<TcpStream> {
    /// Подключиться к серверу и выполнить handshake
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        algorithm: KexAlgorithm,
        timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ChatError::Transport(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "таймаут подключения",
                ))
            })??;

        stream.set_nodelay(true)?;
        info!("TCP подключение установлено: {}", stream.peer_addr()?);

        Self::handshake(stream, algorithm).await
    }
}

impl<T> ChatConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Выполнить handshake поверх готового потока
    pub async fn handshake(io: T, algorithm: KexAlgorithm) -> Result<Self> {
        let mut transport = framed(io);
        let channel = establish_channel(&mut transport, algorithm, Role::Client).await?;
        debug!("Handshake завершён ({})", algorithm);

        Ok(Self {
            transport,
            channel,
            algorithm,
        })
    }

    /// Алгоритм, которым установлен канал
    pub fn algorithm(&self) -> KexAlgorithm {
        self.algorithm
    }

    /// Отправить строку
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let ciphertext = self.channel.encrypt_text(text);
        write_frame(&mut self.transport, Bytes::from(ciphertext)).await
    }

    /// Получить строку от сервера; `None`, если сервер закрыл соединение
    pub async fn recv(&mut self) -> Result<Option<String>> {
        match read_frame(&mut self.transport).await? {
            Some(frame) => self.channel.decrypt_text(&frame),
            None => Ok(None),
        }
    }

    /// Сообщить серверу об уходе и закрыть поток
    pub async fn close(mut self) -> Result<()> {
        write_frame(&mut self.transport, Bytes::new()).await?;
        self.transport.get_mut().shutdown().await?;
        debug!("Подключение закрыто");
        Ok(())
    }
}
