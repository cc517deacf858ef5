//! # MyRC Client Library
//!
//! Клиентская библиотека для группового чата MyRC.
//!
//! Предоставляет API для:
//! - Подключения к серверу и выполнения handshake
//! - Отправки и получения зашифрованных строк

pub mod config;
pub mod connection;

pub use config::ClientConfig;
pub use connection::ChatConnection;
