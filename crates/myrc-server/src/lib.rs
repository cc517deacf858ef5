//! # MyRC Server Library
//!
//! Серверная часть группового чата MyRC.
//!
//! Предоставляет:
//! - Конфигурацию сервера ([`config`])
//! - Реестр клиентов с закреплением имён ([`registry`])
//! - Разбор команд и рассылку ([`router`])
//! - State machine одной сессии ([`session`])
//! - TCP listener ([`listener`])

pub mod config;
pub mod listener;
pub mod registry;
pub mod router;
pub mod session;

pub use config::ServerConfig;
pub use listener::ChatListener;
pub use registry::ClientRegistry;
