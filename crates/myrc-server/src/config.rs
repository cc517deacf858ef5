//! Конфигурация сервера MyRC
//!
//! Этот модуль отвечает за загрузку и валидацию конфигурации сервера.

use myrc_core::KexAlgorithm;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Конфигурация сервера MyRC
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Сетевые настройки
    #[serde(default)]
    pub network: NetworkConfig,

    /// Настройки безопасности
    #[serde(default)]
    pub security: SecurityConfig,

    /// Настройки логирования
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Сетевые настройки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// IP адрес для прослушивания (0.0.0.0 для всех интерфейсов)
    #[serde(default = "default_bind_ip")]
    pub bind_ip: IpAddr,

    /// Порт для прослушивания
    #[serde(default = "default_bind_port")]
    pub port: u16,

    /// Максимальное количество одновременных подключений
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Таймаут handshake (секунды)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

/// Настройки безопасности
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Алгоритм обмена ключами (modp, ecdh, irrational)
    #[serde(default)]
    pub key_exchange: KexAlgorithm,
}

/// Настройки логирования
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Уровень логирования (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Значения по умолчанию
fn default_bind_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_bind_port() -> u16 {
    myrc_core::DEFAULT_PORT
}

fn default_max_connections() -> usize {
    100
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_ip: default_bind_ip(),
            port: default_bind_port(),
            max_connections: default_max_connections(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Загрузить конфигурацию из TOML файла
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Сохранить конфигурацию в TOML файл
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Валидация конфигурации
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        // Порт 0 допустим только в тестах, из файла его не принимаем
        if self.network.port == 0 {
            anyhow::bail!("Порт не может быть 0");
        }

        if self.network.max_connections == 0 {
            anyhow::bail!("max_connections должен быть > 0");
        }

        if self.network.handshake_timeout_secs == 0 {
            anyhow::bail!("handshake_timeout_secs должен быть > 0");
        }

        self.log_level()?;

        Ok(())
    }

    /// Получить SocketAddr для прослушивания
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind_ip, self.network.port)
    }

    /// Получить таймаут handshake
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.network.handshake_timeout_secs)
    }

    /// Уровень логирования из конфигурации
    pub fn log_level(&self) -> Result<Level, anyhow::Error> {
        self.logging
            .level
            .parse::<Level>()
            .map_err(|_| anyhow::anyhow!("Неизвестный уровень логирования: {}", self.logging.level))
    }
}
