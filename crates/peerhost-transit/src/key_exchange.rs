//! Recipient key validation and key header decryption.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use async_trait::async_trait;
use peerhost_core::models::{EncryptedKeyHeader, KeyHeader};
use peerhost_core::AppError;

const NONCE_LEN: usize = 12;

/// Resolves recipient keys by CRC and opens key headers.
#[async_trait]
pub trait KeyExchange: Send + Sync {
    /// Whether `crc` names the current or a still-accepted previous recipient key.
    async fn is_valid_public_key(&self, crc: u32) -> bool;

    /// Decrypt a key header protected by the transfer's shared secret.
    async fn decrypt_key_header(&self, header: &EncryptedKeyHeader) -> Result<KeyHeader, AppError>;
}

/// Key exchange backed by a pre-shared AES-256-GCM secret.
///
/// The encrypted key header's IV is used as the GCM nonce; the plaintext is the
/// file's 16-byte IV followed by its 32-byte AES key.
#[derive(Clone)]
pub struct SharedSecretKeyExchange {
    cipher: Aes256Gcm,
    accepted_crcs: Vec<u32>,
}

impl SharedSecretKeyExchange {
    /// `accepted_crcs[0]` is the current key.
    pub fn new(shared_secret: &[u8], accepted_crcs: Vec<u32>) -> Result<Self, AppError> {
        if shared_secret.len() != 32 {
            return Err(AppError::Internal(
                "Transit shared secret must be 32 bytes (256 bits)".to_string(),
            ));
        }
        let key = Key::<Aes256Gcm>::from_slice(shared_secret);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
            accepted_crcs,
        })
    }

    pub fn current_crc(&self) -> Option<u32> {
        self.accepted_crcs.first().copied()
    }

    /// Protect a key header for sending. Used by peers and tests.
    pub fn encrypt_key_header(&self, header: &KeyHeader) -> Result<EncryptedKeyHeader, AppError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, header.combined().as_slice())
            .map_err(|e| AppError::Internal(format!("Key header encryption failed: {}", e)))?;

        Ok(EncryptedKeyHeader {
            iv: nonce.to_vec(),
            encrypted_aes_key: ciphertext,
        })
    }
}

#[async_trait]
impl KeyExchange for SharedSecretKeyExchange {
    async fn is_valid_public_key(&self, crc: u32) -> bool {
        crc != 0 && self.accepted_crcs.contains(&crc)
    }

    async fn decrypt_key_header(&self, header: &EncryptedKeyHeader) -> Result<KeyHeader, AppError> {
        if header.iv.len() != NONCE_LEN {
            return Err(AppError::InvalidInstructionSet(format!(
                "Key header IV must be {} bytes",
                NONCE_LEN
            )));
        }

        let nonce = Nonce::from_slice(&header.iv);
        let plaintext = self
            .cipher
            .decrypt(nonce, header.encrypted_aes_key.as_slice())
            .map_err(|_| {
                AppError::InvalidInstructionSet("Key header could not be decrypted".to_string())
            })?;

        KeyHeader::from_combined(&plaintext)
            .map_err(|e| AppError::InvalidInstructionSet(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> SharedSecretKeyExchange {
        SharedSecretKeyExchange::new(&[9u8; 32], vec![2002, 2001]).unwrap()
    }

    #[tokio::test]
    async fn test_accepts_current_and_previous_crc() {
        let kx = exchange();
        assert!(kx.is_valid_public_key(2002).await);
        assert!(kx.is_valid_public_key(2001).await);
        assert!(!kx.is_valid_public_key(1999).await);
        assert!(!kx.is_valid_public_key(0).await);
        assert_eq!(kx.current_crc(), Some(2002));
    }

    #[tokio::test]
    async fn test_key_header_roundtrip() {
        let kx = exchange();
        let header = KeyHeader {
            iv: vec![3u8; 16],
            aes_key: vec![4u8; 32],
        };

        let encrypted = kx.encrypt_key_header(&header).unwrap();
        assert_eq!(encrypted.iv.len(), 12);

        let decrypted = kx.decrypt_key_header(&encrypted).await.unwrap();
        assert_eq!(decrypted, header);
    }

    #[tokio::test]
    async fn test_wrong_secret_fails() {
        let header = KeyHeader {
            iv: vec![3u8; 16],
            aes_key: vec![4u8; 32],
        };
        let encrypted = exchange().encrypt_key_header(&header).unwrap();

        let other = SharedSecretKeyExchange::new(&[1u8; 32], vec![2002]).unwrap();
        let result = other.decrypt_key_header(&encrypted).await;
        assert!(matches!(result, Err(AppError::InvalidInstructionSet(_))));
    }

    #[test]
    fn test_secret_length_checked() {
        assert!(SharedSecretKeyExchange::new(&[0u8; 16], vec![1]).is_err());
    }
}
