// src/encryption.rs

use crate::config::Config;
use crate::error::EncryptionError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use rand::RngCore;
use std::fmt;

/// Nonce size for AES-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// How ciphertext is rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingType {
    /// Standard base64 alphabet.
    #[default]
    Base64,
    /// URL and filename safe base64, for values that travel in URLs or headers.
    UrlSafe,
}

impl EncodingType {
    fn encode(self, bytes: &[u8]) -> String {
        match self {
            EncodingType::Base64 => STANDARD.encode(bytes),
            EncodingType::UrlSafe => URL_SAFE.encode(bytes),
        }
    }

    fn decode(self, text: &str) -> Result<Vec<u8>, base64::DecodeError> {
        match self {
            EncodingType::Base64 => STANDARD.decode(text),
            EncodingType::UrlSafe => URL_SAFE.decode(text),
        }
    }
}

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

/// Obfuscates sensitive string fields with AES-GCM.
///
/// The key is taken verbatim as bytes and must be 16 or 32 bytes long. Each
/// value gets a fresh random nonce, stored in front of the ciphertext.
pub struct Encryption {
    cipher: Cipher,
}

impl Encryption {
    pub fn new(key: &str) -> Result<Self, EncryptionError> {
        let bytes = key.as_bytes();
        let cipher = match bytes.len() {
            16 => Cipher::Aes128(Box::new(
                Aes128Gcm::new_from_slice(bytes).map_err(|e| EncryptionError::Cipher(e.to_string()))?,
            )),
            32 => Cipher::Aes256(Box::new(
                Aes256Gcm::new_from_slice(bytes).map_err(|e| EncryptionError::Cipher(e.to_string()))?,
            )),
            n => {
                return Err(EncryptionError::Cipher(format!(
                    "key must be 16 or 32 bytes, got {n}"
                )))
            }
        };
        Ok(Self { cipher })
    }

    /// Builds the helper from `Config::cipher_key`.
    pub fn from_config(config: &Config) -> Result<Self, EncryptionError> {
        let key = config
            .cipher_key
            .as_deref()
            .ok_or_else(|| EncryptionError::Cipher("no cipher key configured".to_string()))?;
        Self::new(key)
    }

    pub fn encrypt(&self, plaintext: &str, encoding: EncodingType) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = match &self.cipher {
            Cipher::Aes128(c) => c.encrypt(nonce, plaintext.as_bytes()),
            Cipher::Aes256(c) => c.encrypt(nonce, plaintext.as_bytes()),
        }
        .map_err(|_| EncryptionError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(encoding.encode(&out))
    }

    pub fn decrypt(&self, encoded: &str, encoding: EncodingType) -> Result<String, EncryptionError> {
        let bytes = encoding
            .decode(encoded.trim())
            .map_err(|e| EncryptionError::Decrypt(format!("invalid encoding: {e}")))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(EncryptionError::Decrypt("value too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = match &self.cipher {
            Cipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            Cipher::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| EncryptionError::Decrypt("authentication failed".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| EncryptionError::Decrypt(format!("invalid UTF-8: {e}")))
    }
}

impl fmt::Debug for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self.cipher {
            Cipher::Aes128(_) => 128,
            Cipher::Aes256(_) => 256,
        };
        f.debug_struct("Encryption").field("key_bits", &bits).finish()
    }
}
