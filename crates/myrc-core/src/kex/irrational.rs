//! Экспериментальный обмен через умножение дробных частей по модулю 1
//!
//! Константа `x = frac(π)`. Приватный ключ: целое `a`, публичный: `frac(a·x)`.
//! Общий секрет: `frac(a·frac(b·x)) = frac(a·b·x)`, что симметрично по `a` и `b`.
//!
//! Дроби хранятся как двоичная фиксированная точка с [`FRACTION_BITS`]
//! разрядами после запятой. Умножение на целое в такой записи точное, поэтому
//! обе стороны получают секрет бит в бит без ошибок округления.
//!
//! Схема не является криптостойкой и оставлена для экспериментов.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{CryptoRng, Rng, RngCore};

use super::{KeyExchange, KeyPair};
use crate::crypto::{SharedSecret, SHARED_SECRET_SIZE};
use crate::error::{ProtocolError, Result};

/// Число двоичных разрядов дробной части
pub const FRACTION_BITS: usize = 576;

/// Ширина дроби в hex-символах на проводе
const FRACTION_HEX_DIGITS: usize = FRACTION_BITS / 4;

/// Разрядность приватного ключа: `a` из `[2^(n-1), 2^n - 1]`
const PRIVATE_KEY_BITS: u32 = 64;

/// Дробная часть π, 576 бит
const PI_FRACTION_HEX: &[u8] = b"\
243F6A8885A308D313198A2E03707344A4093822299F31D0082EFA98EC4E6C89\
452821E638D01377BE5466CF34E90C6CC0AC29B7C97C50DD3F84D5B5B5470917\
9216D5D98979FB1B";

/// Обмен ключами через дробные части
#[derive(Debug, Clone)]
pub struct ModOneDiffieHellman {
    x: BigUint,
    mask: BigUint,
}

impl ModOneDiffieHellman {
    /// Создать обмен с константой frac(π)
    pub fn new() -> Self {
        let x = BigUint::parse_bytes(PI_FRACTION_HEX, 16)
            .expect("константа дробной части π записана в hex");
        let mask = (BigUint::one() << FRACTION_BITS) - BigUint::one();
        Self { x, mask }
    }

    /// frac(n · f) в фиксированной точке
    fn mul_mod_one(&self, n: &BigUint, fraction: &BigUint) -> BigUint {
        (n * fraction) & &self.mask
    }

    fn public_for(&self, private: u64) -> BigUint {
        self.mul_mod_one(&BigUint::from(private), &self.x)
    }

    fn to_fixed_hex(&self, fraction: &BigUint) -> String {
        format!("{:0>width$}", fraction.to_str_radix(16), width = FRACTION_HEX_DIGITS)
    }
}

impl Default for ModOneDiffieHellman {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExchange for ModOneDiffieHellman {
    type PrivateKey = u64;
    type PublicKey = BigUint;

    const NAME: &'static str = "ModOneDiffieHellman";

    fn generate_keypair<R: RngCore + CryptoRng>(&self, rng: &mut R) -> KeyPair<u64, BigUint> {
        let private = rng.gen_range((1u64 << (PRIVATE_KEY_BITS - 1))..=u64::MAX);
        let public = self.public_for(private);
        KeyPair { private, public }
    }

    fn public_to_value(&self, key: &BigUint) -> serde_json::Value {
        serde_json::Value::String(self.to_fixed_hex(key))
    }

    fn public_from_value(&self, value: &serde_json::Value) -> Result<BigUint> {
        let digits = value
            .as_str()
            .ok_or_else(|| ProtocolError::MalformedKey("ожидается hex-строка".into()))?;

        if digits.len() != FRACTION_HEX_DIGITS || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::MalformedKey(format!(
                "ожидается {} hex-символов",
                FRACTION_HEX_DIGITS
            ))
            .into());
        }

        let key = BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| ProtocolError::MalformedKey("не hex-число".into()))?;

        if key.is_zero() {
            return Err(ProtocolError::KeyOutOfDomain("нулевая дробь".into()).into());
        }

        Ok(key)
    }

    fn combine(&self, private: &u64, peer_public: &BigUint) -> Result<SharedSecret> {
        if peer_public.is_zero() {
            return Err(ProtocolError::KeyOutOfDomain("нулевая дробь".into()).into());
        }

        // Значение собеседника совпадает с нашим приватным ключом или
        // с полученным из него публичным
        let private_value = BigUint::from(*private);
        if *peer_public == private_value || *peer_public == self.public_for(*private) {
            return Err(ProtocolError::DegenerateKey.into());
        }

        let shared = self.mul_mod_one(&private_value, peer_public);

        // Фиксированная ширина hex, обрезанная до длины ключа
        let hex_digits = self.to_fixed_hex(&shared);
        let key_hex = &hex_digits[..2 * SHARED_SECRET_SIZE];
        let bytes = hex::decode(key_hex)
            .map_err(|e| ProtocolError::MalformedKey(format!("hex секрета: {}", e)))?;

        SharedSecret::from_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::kex::tests::{assert_roundtrip, assert_symmetric};
    use rand::rngs::OsRng;

    #[test]
    fn test_symmetry() {
        assert_symmetric(&ModOneDiffieHellman::new(), 200);
    }

    #[test]
    fn test_roundtrip() {
        assert_roundtrip(&ModOneDiffieHellman::new());
    }

    #[test]
    fn test_private_key_range() {
        let kex = ModOneDiffieHellman::new();
        for _ in 0..100 {
            let pair = kex.generate_keypair(&mut OsRng);
            assert!(pair.private >= 1u64 << 63);
        }
    }

    #[test]
    fn test_public_is_fraction() {
        let kex = ModOneDiffieHellman::new();
        let pair = kex.generate_keypair(&mut OsRng);
        assert!(pair.public.bits() <= FRACTION_BITS as u64);

        let value = kex.public_to_value(&pair.public);
        assert_eq!(value.as_str().unwrap().len(), FRACTION_HEX_DIGITS);
    }

    #[test]
    fn test_known_value() {
        let kex = ModOneDiffieHellman::new();
        // frac(1 · x) = x
        assert_eq!(kex.public_for(1), kex.x);
        // frac(16 · x): сдвиг hex-записи на один символ
        let shifted = kex.to_fixed_hex(&kex.public_for(16));
        assert!(shifted.starts_with("43f6a8885a308d3"));
    }

    #[test]
    fn test_degenerate_key_rejected() {
        let kex = ModOneDiffieHellman::new();
        let pair = kex.generate_keypair(&mut OsRng);

        let result = kex.combine(&pair.private, &pair.public);
        assert!(matches!(
            result,
            Err(ChatError::Protocol(ProtocolError::DegenerateKey))
        ));
    }

    #[test]
    fn test_private_value_echo_rejected() {
        let kex = ModOneDiffieHellman::new();
        let pair = kex.generate_keypair(&mut OsRng);

        let echoed = BigUint::from(pair.private);
        assert!(matches!(
            kex.combine(&pair.private, &echoed),
            Err(ChatError::Protocol(ProtocolError::DegenerateKey))
        ));

        // Чужой приватный ключ вырожденным не считается
        let other = kex.generate_keypair(&mut OsRng);
        assert!(kex.combine(&pair.private, &BigUint::from(other.private)).is_ok());
    }

    #[test]
    fn test_zero_fraction_rejected() {
        let kex = ModOneDiffieHellman::new();
        let zeros = "0".repeat(FRACTION_HEX_DIGITS);
        assert!(matches!(
            kex.public_from_value(&serde_json::json!(zeros)),
            Err(ChatError::Protocol(ProtocolError::KeyOutOfDomain(_)))
        ));
        assert!(kex.combine(&(1u64 << 63), &BigUint::zero()).is_err());
    }

    #[test]
    fn test_malformed_fraction() {
        let kex = ModOneDiffieHellman::new();
        let cases = [
            serde_json::json!(0.5),
            serde_json::json!("abc"),
            serde_json::json!("g".repeat(FRACTION_HEX_DIGITS)),
        ];
        for value in cases {
            assert!(matches!(
                kex.public_from_value(&value),
                Err(ChatError::Protocol(ProtocolError::MalformedKey(_)))
            ));
        }
    }
}
