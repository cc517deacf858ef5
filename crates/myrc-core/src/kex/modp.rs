//! Диффи-Хеллман по простому модулю
//!
//! Группа: 2048-битный MODP из RFC 3526 (группа 14), генератор 2.
//! Публичный ключ передаётся десятичной строкой: `{"type": "PrimeDiffieHellman", "key": "123..."}`.

use num_bigint::{BigUint, RandBigInt};
use num_traits::One;
use rand::{CryptoRng, RngCore};

use super::{KeyExchange, KeyPair};
use crate::crypto::{SharedSecret, SHARED_SECRET_SIZE};
use crate::error::{ProtocolError, Result};

/// Простой модуль RFC 3526, группа 14
const MODP_2048_PRIME_HEX: &[u8] = b"\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";

/// Генератор группы
const MODP_GENERATOR: u32 = 2;

/// Диффи-Хеллман в мультипликативной группе по модулю p
#[derive(Debug, Clone)]
pub struct PrimeDiffieHellman {
    p: BigUint,
    g: BigUint,
}

impl PrimeDiffieHellman {
    /// Создать обмен в группе RFC 3526
    pub fn new() -> Self {
        let p = BigUint::parse_bytes(MODP_2048_PRIME_HEX, 16)
            .expect("константа модуля RFC 3526 записана в hex");
        Self {
            p,
            g: BigUint::from(MODP_GENERATOR),
        }
    }

    /// Размер модуля в байтах
    fn modulus_len(&self) -> usize {
        ((self.p.bits() + 7) / 8) as usize
    }
}

impl Default for PrimeDiffieHellman {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExchange for PrimeDiffieHellman {
    type PrivateKey = BigUint;
    type PublicKey = BigUint;

    const NAME: &'static str = "PrimeDiffieHellman";

    fn generate_keypair<R: RngCore + CryptoRng>(&self, rng: &mut R) -> KeyPair<BigUint, BigUint> {
        // Равномерно из [1, p-1]
        let private = rng.gen_biguint_range(&BigUint::one(), &self.p);
        let public = self.g.modpow(&private, &self.p);
        KeyPair { private, public }
    }

    fn public_to_value(&self, key: &BigUint) -> serde_json::Value {
        serde_json::Value::String(key.to_str_radix(10))
    }

    fn public_from_value(&self, value: &serde_json::Value) -> Result<BigUint> {
        let digits = value
            .as_str()
            .ok_or_else(|| ProtocolError::MalformedKey("ожидается десятичная строка".into()))?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::MalformedKey(format!(
                "не десятичное число: {:.32}",
                digits
            ))
            .into());
        }

        let key = BigUint::parse_bytes(digits.as_bytes(), 10)
            .ok_or_else(|| ProtocolError::MalformedKey("не десятичное число".into()))?;

        // 0, 1 и p-1 дают предсказуемый секрет, значения >= p вне группы
        let two = BigUint::from(2u32);
        if key < two || key > &self.p - &two {
            return Err(ProtocolError::KeyOutOfDomain("значение вне [2, p-2]".into()).into());
        }

        Ok(key)
    }

    fn combine(&self, private: &BigUint, peer_public: &BigUint) -> Result<SharedSecret> {
        let shared = peer_public.modpow(private, &self.p);

        // Big-endian фиксированной ширины модуля, берём первые 32 байта
        let width = self.modulus_len();
        let raw = shared.to_bytes_be();
        let mut packed = vec![0u8; width];
        packed[width - raw.len()..].copy_from_slice(&raw);

        SharedSecret::from_slice(&packed[..SHARED_SECRET_SIZE])
    }
}
