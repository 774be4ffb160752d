//! AES-256-GCM encryption/decryption
//!
//! Provides authenticated encryption for sealed backup archives.
//! Each encryption operation generates a unique nonce.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{ReceiptsError, ReceiptsResult};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Encrypted data with associated metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    /// The nonce used for this encryption (base64 encoded)
    pub nonce: String,
    /// The encrypted ciphertext with authentication tag (base64 encoded)
    pub ciphertext: String,
    /// Version for future algorithm upgrades
    #[serde(default = "default_version")]
    pub version: u8,
}

fn default_version() -> u8 {
    1
}

impl EncryptedData {
    fn new(nonce: &[u8], ciphertext: &[u8]) -> Self {
        Self {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
            version: 1,
        }
    }

    fn decode_nonce(&self) -> ReceiptsResult<Vec<u8>> {
        STANDARD
            .decode(&self.nonce)
            .map_err(|e| ReceiptsError::Encryption(format!("Invalid nonce encoding: {}", e)))
    }

    fn decode_ciphertext(&self) -> ReceiptsResult<Vec<u8>> {
        STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| ReceiptsError::Encryption(format!("Invalid ciphertext encoding: {}", e)))
    }
}

/// Encrypt plaintext data using AES-256-GCM
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> ReceiptsResult<EncryptedData> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ReceiptsError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| ReceiptsError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedData::new(&nonce_bytes, &ciphertext))
}

/// Decrypt ciphertext using AES-256-GCM
pub fn decrypt(encrypted: &EncryptedData, key: &DerivedKey) -> ReceiptsResult<Vec<u8>> {
    if encrypted.version != 1 {
        return Err(ReceiptsError::Encryption(format!(
            "Unsupported encryption version: {}",
            encrypted.version
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ReceiptsError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let nonce_bytes = encrypted.decode_nonce()?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(ReceiptsError::Encryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = encrypted.decode_ciphertext()?;

    cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
        ReceiptsError::Encryption("Decryption failed: wrong passphrase or corrupted data".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::{derive_key, KeyDerivationParams};

    fn test_key(passphrase: &str) -> DerivedKey {
        derive_key(passphrase, &KeyDerivationParams::light()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_archive_bytes() {
        let key = test_key("receipts");
        let archive: Vec<u8> = b"PK\x03\x04".iter().copied().chain(0..=255u8).collect();

        let encrypted = encrypt(&archive, &key).unwrap();
        let decrypted = decrypt(&encrypted, &key).unwrap();

        assert_eq!(archive, decrypted);
    }

    #[test]
    fn test_different_nonces() {
        let key = test_key("receipts");
        let encrypted1 = encrypt(b"same bytes", &key).unwrap();
        let encrypted2 = encrypt(b"same bytes", &key).unwrap();

        assert_ne!(encrypted1.nonce, encrypted2.nonce);
        assert_ne!(encrypted1.ciphertext, encrypted2.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let params = KeyDerivationParams::light();
        let key1 = derive_key("right", &params).unwrap();
        let key2 = derive_key("wrong", &params).unwrap();

        let encrypted = encrypt(b"receipt data", &key1).unwrap();
        assert!(decrypt(&encrypted, &key2).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key("receipts");
        let mut encrypted = encrypt(b"receipt data", &key).unwrap();

        let mut ciphertext = STANDARD.decode(&encrypted.ciphertext).unwrap();
        ciphertext[0] ^= 0xFF;
        encrypted.ciphertext = STANDARD.encode(&ciphertext);

        assert!(decrypt(&encrypted, &key).is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let key = test_key("receipts");
        let mut encrypted = encrypt(b"receipt data", &key).unwrap();
        encrypted.version = 2;

        let err = decrypt(&encrypted, &key).unwrap_err();
        assert!(err.to_string().contains("Unsupported encryption version"));
    }
}
