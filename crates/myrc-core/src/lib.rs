//! # MyRC Core (myrc-core)
//!
//! Ядро протокола MyRC, небольшого группового чата с шифрованием.
//!
//! ## Возможности
//!
//! - **Обмен ключами**: три взаимозаменяемых алгоритма за одним интерфейсом
//!   ([`kex::KeyExchange`]): Диффи-Хеллман по простому модулю, на Curve25519
//!   и экспериментальный через дробные части
//! - **Handshake**: один кадр с публичным ключом в каждую сторону
//! - **Шифрование**: AES-256 с PKCS#7 padding поверх общего секрета
//! - **Кадрирование**: длина u32 big-endian + payload до 2048 байт
//!
//! ## Структура
//!
//! - [`kex`]: алгоритмы обмена ключами
//! - [`crypto`]: общий секрет и зашифрованный канал
//! - [`frame`]: кадрирование потока
//! - [`handshake`]: протокол установления соединения
//! - [`error`]: типы ошибок
//!
//! ## Пример использования
//!
//! ```rust,no_run
//! use myrc_core::{
//!     frame::framed,
//!     handshake::{establish_channel, Role},
//!     kex::KexAlgorithm,
//! };
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:4040").await?;
//! let mut transport = framed(stream);
//!
//! let channel = establish_channel(&mut transport, KexAlgorithm::Ecdh, Role::Client).await?;
//! let ciphertext = channel.encrypt_text("alice");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crypto;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod kex;

// Re-экспорт основных типов для удобства
pub use crypto::{SecureChannel, SharedSecret};
pub use error::{ChatError, Result};
pub use kex::KexAlgorithm;

/// Версия библиотеки
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Порт сервера по умолчанию
pub const DEFAULT_PORT: u16 = 4040;
