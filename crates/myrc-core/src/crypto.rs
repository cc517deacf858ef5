//! Симметричное шифрование сообщений MyRC
//!
//! После handshake обе стороны держат одинаковый [`SharedSecret`] длиной
//! 32 байта. Из него строится [`SecureChannel`]: AES-256 в режиме ECB
//! (крейт `ecb`) с PKCS#7 padding до размера блока.
//!
//! Режим ECB не использует IV/nonce: одинаковые блоки открытого текста дают
//! одинаковые блоки шифротекста. Это известное ограничение формата на проводе,
//! смена режима ломает совместимость с существующими клиентами.

use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyInit,
};
use aes::Aes256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, ProtocolError, Result};

/// Размер общего секрета (ключ AES-256)
pub const SHARED_SECRET_SIZE: usize = 32;

/// Размер блока AES
pub const BLOCK_SIZE: usize = 16;

type Aes256EcbEnc = ecb::Encryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

/// Общий секрет после обмена ключами (автоматически зануляется)
#[derive(Clone, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; SHARED_SECRET_SIZE],
}

impl SharedSecret {
    /// Создать из массива фиксированного размера
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self { bytes }
    }

    /// Создать из среза, проверив длину
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SHARED_SECRET_SIZE {
            return Err(CryptoError::InvalidKeySize {
                expected: SHARED_SECRET_SIZE,
                actual: bytes.len(),
            }
            .into());
        }

        let mut key_bytes = [0u8; SHARED_SECRET_SIZE];
        key_bytes.copy_from_slice(bytes);
        let secret = Self::from_bytes(key_bytes);
        key_bytes.zeroize();

        Ok(secret)
    }

    /// Получить байты общего секрета
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Зашифрованный канал поверх общего секрета
///
/// Режим блочного шифра расходуется на каждое сообщение, поэтому канал
/// хранит ключ, а не готовый шифратор.
#[derive(Clone)]
pub struct SecureChannel {
    key: SharedSecret,
}

impl SecureChannel {
    /// Создать канал из общего секрета
    pub fn new(secret: &SharedSecret) -> Self {
        Self {
            key: secret.clone(),
        }
    }

    /// Зашифровать данные
    ///
    /// Результат детерминирован: один и тот же открытый текст всегда даёт
    /// один и тот же шифротекст. Длина результата всегда кратна [`BLOCK_SIZE`]
    /// и не меньше одного блока.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256EcbEnc::new(GenericArray::from_slice(self.key.as_bytes()))
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Расшифровать данные
    ///
    /// # Возвращает
    /// - `Ok(None)` для пустого входа (собеседник закрыл передачу)
    /// - `Ok(Some(plaintext))` при успехе
    /// - `Err(CryptoError)` если длина не кратна блоку или padding неверный
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Option<Vec<u8>>> {
        if ciphertext.is_empty() {
            return Ok(None);
        }

        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidCiphertextLength {
                len: ciphertext.len(),
                block_size: BLOCK_SIZE,
            }
            .into());
        }

        let plaintext = Aes256EcbDec::new(GenericArray::from_slice(self.key.as_bytes()))
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::InvalidPadding)?;
        Ok(Some(plaintext))
    }

    /// Зашифровать текстовую строку
    pub fn encrypt_text(&self, text: &str) -> Vec<u8> {
        self.encrypt(text.as_bytes())
    }

    /// Расшифровать текстовую строку
    pub fn decrypt_text(&self, ciphertext: &[u8]) -> Result<Option<String>> {
        match self.decrypt(ciphertext)? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel").finish_non_exhaustive()
    }
}

/// Размер шифротекста для открытого текста заданной длины
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    (plaintext_len / BLOCK_SIZE + 1) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use rand::rngs::OsRng;
    use rand::RngCore;

    fn random_channel() -> SecureChannel {
        let mut bytes = [0u8; SHARED_SECRET_SIZE];
        OsRng.fill_bytes(&mut bytes);
        SecureChannel::new(&SharedSecret::from_bytes(bytes))
    }

    #[test]
    fn test_roundtrip_boundary_lengths() {
        let channel = random_channel();

        for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 255, 2000] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let ciphertext = channel.encrypt(&plaintext);

            assert_eq!(ciphertext.len(), ciphertext_len(len));
            assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);

            let decrypted = channel.decrypt(&ciphertext).unwrap();
            assert_eq!(decrypted, Some(plaintext));
        }
    }

    #[test]
    fn test_empty_input_is_no_content() {
        let channel = random_channel();
        assert!(channel.decrypt(&[]).unwrap().is_none());
        assert!(channel.decrypt_text(&[]).unwrap().is_none());
    }

    #[test]
    fn test_encrypt_is_deterministic() {
        let channel = random_channel();
        let a = channel.encrypt(b"same message");
        let b = channel.encrypt(b"same message");
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_or_garbles() {
        let alice = random_channel();
        let mallory = random_channel();

        let ciphertext = alice.encrypt(b"Hello, MyRC!");
        match mallory.decrypt(&ciphertext) {
            Ok(Some(plaintext)) => assert_ne!(plaintext, b"Hello, MyRC!"),
            Ok(None) => panic!("непустой шифротекст не может быть пустым"),
            Err(e) => assert!(matches!(e, ChatError::Crypto(CryptoError::InvalidPadding))),
        }
    }

    #[test]
    fn test_invalid_length() {
        let channel = random_channel();
        let result = channel.decrypt(&[0u8; 17]);
        assert!(matches!(
            result,
            Err(ChatError::Crypto(CryptoError::InvalidCiphertextLength { len: 17, .. }))
        ));
    }

    #[test]
    fn test_invalid_padding() {
        let channel = random_channel();
        let mut ciphertext = channel.encrypt(b"0123456789abcdef");
        // Последний блок целиком состоит из padding; портим его
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xFF;

        let result = channel.decrypt(&ciphertext);
        match result {
            Err(ChatError::Crypto(CryptoError::InvalidPadding)) => {}
            Ok(Some(plaintext)) => assert_ne!(plaintext, b"0123456789abcdef"),
            other => panic!("неожиданный результат: {:?}", other),
        }
    }

    #[test]
    fn test_pkcs7_padding() {
        let channel = random_channel();
        assert_eq!(channel.encrypt(b"").len(), BLOCK_SIZE);
        assert_eq!(channel.encrypt(&[1u8; 16]).len(), 2 * BLOCK_SIZE);

        // Блок из нулей без padding: последний байт 0 недопустим
        let ciphertext = channel.encrypt(&[0u8; BLOCK_SIZE]);
        assert!(matches!(
            channel.decrypt(&ciphertext[..BLOCK_SIZE]),
            Err(ChatError::Crypto(CryptoError::InvalidPadding))
        ));

        // Блок из байтов 0x11 (17) длиннее блока
        let ciphertext = channel.encrypt(&[0x11u8; BLOCK_SIZE]);
        assert!(matches!(
            channel.decrypt(&ciphertext[..BLOCK_SIZE]),
            Err(ChatError::Crypto(CryptoError::InvalidPadding))
        ));
    }

    #[test]
    fn test_known_answer() {
        // FIPS-197, приложение C.3: AES-256, первый блок шифротекста ECB
        let key: Vec<u8> = (0u8..32).collect();
        let channel = SecureChannel::new(&SharedSecret::from_slice(&key).unwrap());
        let plaintext: Vec<u8> = (0u8..16).map(|i| i * 0x11).collect();

        let ciphertext = channel.encrypt(&plaintext);
        assert_eq!(ciphertext.len(), 2 * BLOCK_SIZE);
        assert_eq!(
            hex::encode(&ciphertext[..BLOCK_SIZE]),
            "8ea2b7ca516745bfeafc49904b496089"
        );
    }

    #[test]
    fn test_text_roundtrip() {
        let channel = random_channel();
        let ciphertext = channel.encrypt_text("Привет, мир!");
        assert_eq!(
            channel.decrypt_text(&ciphertext).unwrap().as_deref(),
            Some("Привет, мир!")
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let channel = random_channel();
        let ciphertext = channel.encrypt(&[0xFF, 0xFE, 0xFD]);
        assert!(matches!(
            channel.decrypt_text(&ciphertext),
            Err(ChatError::Protocol(ProtocolError::InvalidUtf8))
        ));
    }

    #[test]
    fn test_shared_secret_size() {
        assert!(SharedSecret::from_slice(&[0u8; 32]).is_ok());
        assert!(SharedSecret::from_slice(&[0u8; 16]).is_err());
        assert_eq!(format!("{:?}", SharedSecret::from_bytes([7u8; 32])), "SharedSecret(..)");
    }
}
