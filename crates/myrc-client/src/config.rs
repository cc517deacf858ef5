//! Конфигурация клиента MyRC
//!
//! Этот модуль отвечает за загрузку и валидацию конфигурации клиента.

use myrc_core::KexAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Конфигурация клиента MyRC
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Настройки сервера
    #[serde(default)]
    pub server: ServerConfig,

    /// Настройки безопасности
    #[serde(default)]
    pub security: SecurityConfig,

    /// Настройки логирования
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Настройки сервера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP адрес или hostname сервера
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Порт сервера
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Таймаут подключения (секунды)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// Настройки безопасности
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Алгоритм обмена ключами, должен совпадать с сервером
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
fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    myrc_core::DEFAULT_PORT
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    // Логи клиента смешиваются с чатом в терминале
    "warn".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            connection_timeout_secs: default_connection_timeout(),
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

impl ClientConfig {
    /// Загрузить конфигурацию из TOML файла
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
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
        if self.server.host.is_empty() {
            anyhow::bail!("Адрес сервера не указан");
        }

        if self.server.port == 0 {
            anyhow::bail!("Порт сервера не может быть 0");
        }

        if self.server.connection_timeout_secs == 0 {
            anyhow::bail!("connection_timeout_secs должен быть > 0");
        }

        self.log_level()?;

        Ok(())
    }

    /// Адрес сервера в виде `host:port`
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Получить таймаут подключения
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connection_timeout_secs)
    }

    /// Уровень логирования из конфигурации
    pub fn log_level(&self) -> Result<Level, anyhow::Error> {
        self.logging
            .level
            .parse::<Level>()
            .map_err(|_| anyhow::anyhow!("Неизвестный уровень логирования: {}", self.logging.level))
    }
}
