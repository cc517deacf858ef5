//! Типы ошибок для MyRC
//!
//! Все ошибки одной сессии остаются внутри её задачи: сервер закрывает
//! соединение и продолжает обслуживать остальных клиентов.

use thiserror::Error;

/// Основной тип ошибок протокола MyRC
#[derive(Error, Debug)]
pub enum ChatError {
    /// Некорректный формат сообщения или ключа (всегда фатально для сессии)
    #[error("Ошибка протокола: {0}")]
    Protocol(#[from] ProtocolError),

    /// Ошибка шифрования/расшифровки (рассинхронизация потока)
    #[error("Криптографическая ошибка: {0}")]
    Crypto(#[from] CryptoError),

    /// Ошибка state machine handshake
    #[error("Ошибка handshake: {0}")]
    Handshake(#[from] HandshakeError),

    /// Ошибка транспорта (обрыв, сброс соединения)
    #[error("Ошибка транспорта: {0}")]
    Transport(#[from] std::io::Error),

    /// Имя пользователя уже занято другой сессией
    #[error("Имя пользователя '{username}' уже занято")]
    NegotiationConflict {
        /// Запрошенное имя
        username: String,
    },
}

impl ChatError {
    /// Ошибка означает обычное отключение клиента, а не сбой
    pub fn is_disconnect(&self) -> bool {
        match self {
            ChatError::Transport(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Ошибки формата сообщений
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Тег алгоритма не совпадает с настроенным
    #[error("Несовпадение алгоритма обмена ключами: ожидается {expected}, получено {actual}")]
    AlgorithmMismatch {
        /// Настроенный алгоритм
        expected: String,
        /// Алгоритм из сообщения
        actual: String,
    },

    /// Не удалось разобрать JSON сообщения с ключом
    #[error("Некорректное сообщение с публичным ключом: {0}")]
    InvalidKeyMessage(#[from] serde_json::Error),

    /// Поля ключа отсутствуют или имеют неверный формат
    #[error("Некорректный публичный ключ: {0}")]
    MalformedKey(String),

    /// Значение ключа вне допустимой области
    #[error("Публичный ключ вне допустимой области: {0}")]
    KeyOutOfDomain(String),

    /// Ключ собеседника совпадает с локальным (вырожденный обмен)
    #[error("Вырожденный ключ: значение собеседника совпадает с локальным")]
    DegenerateKey,

    /// Превышен максимальный размер кадра
    #[error("Превышен максимальный размер кадра ({max} байт)")]
    FrameTooLarge {
        /// Допустимый максимум
        max: usize,
    },

    /// Соединение закрыто до получения ожидаемого кадра
    #[error("Соединение закрыто во время {0}")]
    UnexpectedClose(&'static str),

    /// Расшифрованные данные не являются UTF-8
    #[error("Сообщение не является корректным UTF-8")]
    InvalidUtf8,
}

/// Ошибки криптографических операций
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Длина шифротекста не кратна размеру блока
    #[error("Некорректная длина шифротекста: {len} не кратно {block_size}")]
    InvalidCiphertextLength {
        /// Полученная длина
        len: usize,
        /// Размер блока
        block_size: usize,
    },

    /// Некорректный padding после расшифровки
    #[error("Некорректный padding (возможно, неверный ключ или повреждённые данные)")]
    InvalidPadding,

    /// Некорректный размер ключа
    #[error("Некорректный размер ключа: ожидается {expected}, получено {actual}")]
    InvalidKeySize {
        /// Ожидаемый размер
        expected: usize,
        /// Полученный размер
        actual: usize,
    },
}

/// Ошибки процесса handshake
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Повторный вызов после завершения
    #[error("Handshake уже завершён")]
    AlreadyCompleted,

    /// Некорректное состояние state machine
    #[error("Некорректное состояние handshake state machine: {0}")]
    InvalidState(String),

    /// Тайм-аут handshake
    #[error("Тайм-аут handshake: превышено время ожидания {timeout_ms} мс")]
    Timeout {
        /// Тайм-аут в миллисекундах
        timeout_ms: u64,
    },
}

/// Псевдоним для Result с ошибкой MyRC
pub type Result<T> = std::result::Result<T, ChatError>;
