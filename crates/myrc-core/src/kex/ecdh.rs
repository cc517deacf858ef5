//! Диффи-Хеллман на эллиптической кривой Curve25519
//!
//! Публичный ключ: x-координата точки (u в форме Монтгомери), 32 байта в hex.
//! Общий секрет: x-координата произведения точки собеседника на локальный скаляр.
//!
//! Координата, лежащая на квадратичном кручении кривой, отвергается при
//! разборе; точка малого порядка отвергается при вычислении секрета.

use curve25519_dalek::montgomery::MontgomeryPoint;
use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};

use super::{KeyExchange, KeyPair};
use crate::crypto::SharedSecret;
use crate::error::{ProtocolError, Result};

/// Размер координаты точки (32 байта)
pub const X25519_KEY_SIZE: usize = 32;

/// Диффи-Хеллман на Curve25519
#[derive(Debug, Clone, Copy, Default)]
pub struct EcDiffieHellman;

impl EcDiffieHellman {
    /// Создать обмен
    pub fn new() -> Self {
        Self
    }
}

impl KeyExchange for EcDiffieHellman {
    type PrivateKey = StaticSecret;
    type PublicKey = PublicKey;

    const NAME: &'static str = "ECDiffieHellman";

    fn generate_keypair<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> KeyPair<StaticSecret, PublicKey> {
        let private = StaticSecret::random_from_rng(rng);
        let public = PublicKey::from(&private);
        KeyPair { private, public }
    }

    fn public_to_value(&self, key: &PublicKey) -> serde_json::Value {
        serde_json::json!({ "x": hex::encode(key.as_bytes()) })
    }

    fn public_from_value(&self, value: &serde_json::Value) -> Result<PublicKey> {
        let x = value
            .get("x")
            .and_then(|x| x.as_str())
            .ok_or_else(|| ProtocolError::MalformedKey("ожидается объект {\"x\": hex}".into()))?;

        let bytes = hex::decode(x)
            .map_err(|e| ProtocolError::MalformedKey(format!("x не является hex: {}", e)))?;

        let bytes: [u8; X25519_KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            ProtocolError::MalformedKey(format!(
                "x: ожидается {} байт, получено {}",
                X25519_KEY_SIZE,
                bytes.len()
            ))
        })?;

        // Без v-координаты кривая и кручение неразличимы: проверяем через
        // отображение в форму Эдвардса
        if MontgomeryPoint(bytes).to_edwards(0).is_none() {
            return Err(ProtocolError::KeyOutOfDomain("точка не лежит на Curve25519".into()).into());
        }

        Ok(PublicKey::from(bytes))
    }

    fn combine(&self, private: &StaticSecret, peer_public: &PublicKey) -> Result<SharedSecret> {
        let shared = private.diffie_hellman(peer_public);

        // Точка малого порядка даёт нулевой секрет, не зависящий от нашего скаляра
        if !shared.was_contributory() {
            return Err(ProtocolError::KeyOutOfDomain(
                "точка малого порядка на Curve25519".into(),
            )
            .into());
        }

        Ok(SharedSecret::from_bytes(shared.to_bytes()))
    }
}
