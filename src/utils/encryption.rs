use aes_gcm::{aead::Aead, aead::KeyInit, Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_core::{OsRng, RngCore};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum EncryptionError {
    #[error("encryption key must be 32 bytes")]
    InvalidKeyLength,
    #[error("failed to encrypt secret")]
    Encrypt,
    #[error("failed to decrypt secret")]
    Decrypt,
    #[error("invalid ciphertext encoding")]
    InvalidEncoding,
}

pub fn decode_key(key_b64: &str) -> Result<Vec<u8>, EncryptionError> {
    let decoded = STANDARD
        .decode(key_b64.trim())
        .map_err(|_| EncryptionError::InvalidEncoding)?;
    if decoded.len() != KEY_LEN {
        return Err(EncryptionError::InvalidKeyLength);
    }
    Ok(decoded)
}

/// Seals channel credentials at rest. Output is base64(nonce || ciphertext).
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    pub fn new(key: &[u8]) -> Result<Self, EncryptionError> {
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EncryptionError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(combined))
    }

    pub fn open(&self, sealed_b64: &str) -> Result<String, EncryptionError> {
        let data = STANDARD
            .decode(sealed_b64)
            .map_err(|_| EncryptionError::InvalidEncoding)?;
        if data.len() <= NONCE_LEN {
            return Err(EncryptionError::InvalidEncoding);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| EncryptionError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| EncryptionError::Decrypt)
    }
}
