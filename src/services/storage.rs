use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::MediaSettings;

type HmacSha256 = Hmac<Sha256>;

pub const MEDIA_DIR: &str = "images";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key")]
    InvalidKey,
    #[error("object not found")]
    NotFound,
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-storage collaborator. The core only ever keeps keys.
#[async_trait]
pub trait ContentStorage: Send + Sync {
    /// Stores bytes under `<dir>/<uuid>.<ext>` and returns the key.
    async fn store(
        &self,
        dir: &str,
        extension: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError>;

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Short-lived retrieval URL for `key`.
    fn signed_url(&self, key: &str) -> Result<String, StorageError>;
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    ttl: Duration,
    public_base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("ttl", &self.ttl)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: Vec<u8>, ttl: Duration, public_base_url: &str) -> Self {
        Self {
            secret,
            ttl,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    pub fn url_for(&self, key: &str, now: OffsetDateTime) -> String {
        let expires = now.unix_timestamp() + self.ttl.as_secs() as i64;
        format!(
            "{}/api/media/{}?expires={}&signature={}",
            self.public_base_url,
            key,
            expires,
            self.sign(key, expires)
        )
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: OffsetDateTime) -> bool {
        if expires < now.unix_timestamp() {
            return false;
        }
        let expected = self.sign(key, expires);
        bool::from(expected.as_bytes().ct_eq(signature.as_bytes()))
    }
}

pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let well_formed = !key.is_empty()
        && !key.starts_with('/')
        && !key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'));
    if well_formed {
        Ok(())
    } else {
        Err(StorageError::InvalidKey)
    }
}

fn new_key(dir: &str, extension: Option<&str>) -> String {
    let ext = extension
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("{}/{}.{}", dir, Uuid::new_v4(), ext),
        None => format!("{}/{}", dir, Uuid::new_v4()),
    }
}

pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

pub struct FsContentStorage {
    root: PathBuf,
    signer: UrlSigner,
}

impl FsContentStorage {
    pub fn new(settings: &MediaSettings) -> Self {
        Self {
            root: settings.root.clone(),
            signer: UrlSigner::new(
                settings.signing_secret.clone(),
                settings.url_ttl,
                &settings.public_base_url,
            ),
        }
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }
}

#[async_trait]
impl ContentStorage for FsContentStorage {
    async fn store(
        &self,
        dir: &str,
        extension: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        validate_key(dir)?;
        let key = new_key(dir, extension);
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(key)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        match tokio::fs::read(self.root.join(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn signed_url(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(self.signer.url_for(key, OffsetDateTime::now_utc()))
    }
}
