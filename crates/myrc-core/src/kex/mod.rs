//! Обмен ключами
//!
//! Все алгоритмы реализуют один трейт [`KeyExchange`] и используют один формат
//! сообщения на проводе:
//!
//! ```json
//! {"type": "<имя алгоритма>", "key": <значение, зависящее от алгоритма>}
//! ```
//!
//! Алгоритм выбирается конфигурацией ([`KexAlgorithm`]) при создании сессии.
//! Получатель сверяет только объявленный тег и отклоняет чужой алгоритм.
//!
//! - [`modp`]: Диффи-Хеллман в мультипликативной группе по простому модулю
//! - [`ecdh`]: Диффи-Хеллман на кривой Curve25519
//! - [`irrational`]: экспериментальная схема умножения дробных частей по модулю 1

pub mod ecdh;
pub mod irrational;
pub mod modp;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::crypto::SharedSecret;
use crate::error::{ProtocolError, Result};

pub use ecdh::EcDiffieHellman;
pub use irrational::ModOneDiffieHellman;
pub use modp::PrimeDiffieHellman;

/// Пара ключей: приватный никогда не покидает процесс
#[derive(Debug, Clone)]
pub struct KeyPair<S, P> {
    /// Приватное значение
    pub private: S,
    /// Публичное значение (единственное, что передаётся по сети)
    pub public: P,
}

/// Сообщение с публичным ключом на проводе
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyMessage {
    /// Имя алгоритма, создавшего ключ
    #[serde(rename = "type")]
    pub algorithm: String,
    /// Значение ключа
    pub key: serde_json::Value,
}

/// Общий интерфейс алгоритмов обмена ключами
pub trait KeyExchange {
    /// Приватный ключ
    type PrivateKey;
    /// Публичный ключ
    type PublicKey: Clone + PartialEq + std::fmt::Debug;

    /// Тег алгоритма в сообщении на проводе
    const NAME: &'static str;

    /// Сгенерировать свежую пару ключей
    fn generate_keypair<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> KeyPair<Self::PrivateKey, Self::PublicKey>;

    /// Значение ключа внутри поля `key`
    fn public_to_value(&self, key: &Self::PublicKey) -> serde_json::Value;

    /// Разобрать значение поля `key` с проверкой области допустимых значений
    fn public_from_value(&self, value: &serde_json::Value) -> Result<Self::PublicKey>;

    /// Вычислить общий секрет: `combine(a, B) == combine(b, A)`
    fn combine(
        &self,
        private: &Self::PrivateKey,
        peer_public: &Self::PublicKey,
    ) -> Result<SharedSecret>;

    /// Сериализовать публичный ключ для отправки
    fn serialize_public(&self, key: &Self::PublicKey) -> Vec<u8> {
        let message = PublicKeyMessage {
            algorithm: Self::NAME.to_string(),
            key: self.public_to_value(key),
        };
        // Сериализация Value в память не может завершиться ошибкой
        serde_json::to_vec(&message).unwrap_or_default()
    }

    /// Разобрать публичный ключ собеседника
    fn deserialize_public(&self, bytes: &[u8]) -> Result<Self::PublicKey> {
        let message: PublicKeyMessage =
            serde_json::from_slice(bytes).map_err(ProtocolError::InvalidKeyMessage)?;

        if message.algorithm != Self::NAME {
            return Err(ProtocolError::AlgorithmMismatch {
                expected: Self::NAME.to_string(),
                actual: message.algorithm,
            }
            .into());
        }

        self.public_from_value(&message.key)
    }
}

/// Алгоритм обмена ключами, выбираемый конфигурацией
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KexAlgorithm {
    /// Диффи-Хеллман по простому модулю
    Modp,
    /// Диффи-Хеллман на эллиптической кривой
    #[default]
    Ecdh,
    /// Умножение дробных частей (экспериментальный)
    Irrational,
}

impl KexAlgorithm {
    /// Все поддерживаемые алгоритмы
    pub const ALL: [KexAlgorithm; 3] = [
        KexAlgorithm::Modp,
        KexAlgorithm::Ecdh,
        KexAlgorithm::Irrational,
    ];

    /// Тег алгоритма на проводе
    pub fn wire_name(&self) -> &'static str {
        match self {
            KexAlgorithm::Modp => PrimeDiffieHellman::NAME,
            KexAlgorithm::Ecdh => EcDiffieHellman::NAME,
            KexAlgorithm::Irrational => ModOneDiffieHellman::NAME,
        }
    }

    /// Имя алгоритма в конфигурации
    pub fn config_name(&self) -> &'static str {
        match self {
            KexAlgorithm::Modp => "modp",
            KexAlgorithm::Ecdh => "ecdh",
            KexAlgorithm::Irrational => "irrational",
        }
    }
}

impl std::fmt::Display for KexAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.config_name())
    }
}

impl std::str::FromStr for KexAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "modp" => Ok(KexAlgorithm::Modp),
            "ecdh" => Ok(KexAlgorithm::Ecdh),
            "irrational" => Ok(KexAlgorithm::Irrational),
            unknown => Err(format!("Неизвестный алгоритм обмена ключами: {}", unknown)),
        }
    }
}
