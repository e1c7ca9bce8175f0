use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::channel::Platform;

pub mod linkedin;

pub use linkedin::LinkedInAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMedia {
    pub key: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub channel_id: Uuid,
    pub access_token: String,
    pub content: String,
    pub media: Option<PublishMedia>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { external_id: Option<String> },
    /// The platform is recognised but has no live adapter yet.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Invalid { status: u16, message: String },
    /// The platform has no token check.
    Unchecked,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("request to {platform} failed: {message}")]
    Network {
        platform: Platform,
        message: String,
    },
    #[error("{platform} responded with status {status} during {step}: {message}")]
    UnexpectedStatus {
        platform: Platform,
        step: &'static str,
        status: u16,
        message: String,
    },
    #[error("{platform} returned an invalid response during {step}: {message}")]
    InvalidResponse {
        platform: Platform,
        step: &'static str,
        message: String,
    },
    #[error("media could not be loaded: {0}")]
    Media(String),
}

impl PlatformError {
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::Network { .. } => "platform_unreachable",
            PlatformError::UnexpectedStatus { status: 401, .. } => "platform_unauthorized",
            PlatformError::UnexpectedStatus { .. } => "platform_rejected",
            PlatformError::InvalidResponse { .. } => "platform_invalid_response",
            PlatformError::Media(_) => "media_unavailable",
        }
    }

    pub fn to_failure(&self) -> PlatformFailure {
        PlatformFailure {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Structured `{code, message}` reported per channel instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformFailure {
    pub code: String,
    pub message: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome, PlatformError>;

    async fn check_token(&self, access_token: &str) -> Result<TokenStatus, PlatformError>;
}

/// Placeholder for platforms without a live integration.
pub struct StubAdapter {
    platform: Platform,
}

impl StubAdapter {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(&self, _request: PublishRequest) -> Result<PublishOutcome, PlatformError> {
        Ok(PublishOutcome::Skipped {
            reason: format!("Publishing to {} is not supported yet", self.platform),
        })
    }

    async fn check_token(&self, _access_token: &str) -> Result<TokenStatus, PlatformError> {
        Ok(TokenStatus::Unchecked)
    }
}

#[derive(Clone)]
pub struct PlatformRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    /// Platforms backed by a registered adapter rather than a stub.
    live: HashSet<Platform>,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformRegistry {
    /// Every platform starts out with a stub.
    pub fn new() -> Self {
        let adapters = Platform::ALL
            .into_iter()
            .map(|p| (p, Arc::new(StubAdapter::new(p)) as Arc<dyn PlatformAdapter>))
            .collect();
        Self {
            adapters,
            live: HashSet::new(),
        }
    }

    pub fn register(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        let platform = adapter.platform();
        self.adapters.insert(platform, adapter);
        self.live.insert(platform);
        self
    }

    pub fn is_live(&self, platform: Platform) -> bool {
        self.live.contains(&platform)
    }

    pub fn adapter(&self, platform: Platform) -> Arc<dyn PlatformAdapter> {
        match self.adapters.get(&platform) {
            Some(adapter) => adapter.clone(),
            None => Arc::new(StubAdapter::new(platform)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PublishRequest {
        PublishRequest {
            channel_id: Uuid::new_v4(),
            access_token: "token".into(),
            content: "hi".into(),
            media: None,
        }
    }

    #[tokio::test]
    async fn stub_adapters_skip_without_error() {
        let registry = PlatformRegistry::new();
        let outcome = registry
            .adapter(Platform::Twitter)
            .publish(request())
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Skipped { .. }));
        assert_eq!(
            registry
                .adapter(Platform::Tiktok)
                .check_token("t")
                .await
                .unwrap(),
            TokenStatus::Unchecked
        );
    }

    #[tokio::test]
    async fn registered_adapter_replaces_stub() {
        let mut mock = MockPlatformAdapter::new();
        mock.expect_platform().return_const(Platform::Linkedin);
        mock.expect_publish().returning(|_| {
            Ok(PublishOutcome::Published {
                external_id: Some("urn:li:share:1".into()),
            })
        });

        let registry = PlatformRegistry::new().register(Arc::new(mock));
        assert!(registry.is_live(Platform::Linkedin));
        assert!(!registry.is_live(Platform::Twitter));
        let outcome = registry
            .adapter(Platform::Linkedin)
            .publish(request())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                external_id: Some("urn:li:share:1".into())
            }
        );
    }

    #[test]
    fn failures_carry_stable_codes() {
        let err = PlatformError::UnexpectedStatus {
            platform: Platform::Linkedin,
            step: "userinfo",
            status: 401,
            message: "expired".into(),
        };
        let failure = err.to_failure();
        assert_eq!(failure.code, "platform_unauthorized");
        assert!(failure.message.contains("expired"));
    }
}
