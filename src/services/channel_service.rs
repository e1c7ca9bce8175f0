use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::channel_repository::ChannelRepository;
use crate::models::channel::{Channel, ChannelView, NewChannel, Platform};
use crate::responses::ApiError;
use crate::services::platforms::{PlatformError, PlatformRegistry, TokenStatus};
use crate::services::workspace_policy::{AccessError, WorkspacePolicy};
use crate::utils::encryption::{EncryptionError, TokenCipher};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("Channel not found")]
    NotFound,
    #[error("Channel already exists")]
    Conflict,
    #[error(transparent)]
    Upstream(#[from] PlatformError),
    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError for ChannelError {
    fn status(&self) -> StatusCode {
        match self {
            ChannelError::Validation(_) => StatusCode::BAD_REQUEST,
            ChannelError::Access(err) => err.status(),
            ChannelError::NotFound => StatusCode::NOT_FOUND,
            ChannelError::Conflict => StatusCode::CONFLICT,
            ChannelError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ChannelError::Encryption(_) | ChannelError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ChannelError::Upstream(err) => Some(err.code()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannel {
    pub platform: Platform,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatusReport {
    pub channel_id: Uuid,
    pub platform: Platform,
    pub is_valid: bool,
    /// False when no platform call was made.
    pub checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct ChannelService {
    channels: Arc<dyn ChannelRepository>,
    policy: WorkspacePolicy,
    cipher: TokenCipher,
    platforms: PlatformRegistry,
}

impl ChannelService {
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        policy: WorkspacePolicy,
        cipher: TokenCipher,
        platforms: PlatformRegistry,
    ) -> Self {
        Self {
            channels,
            policy,
            cipher,
            platforms,
        }
    }

    pub fn supported_platforms(&self) -> Vec<Platform> {
        Platform::ALL.to_vec()
    }

    pub async fn list_channels(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<ChannelView>, ChannelError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        let channels = self.channels.list_channels(workspace_id).await?;
        Ok(channels.iter().map(ChannelView::from).collect())
    }

    pub async fn create_channel(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        request: CreateChannel,
    ) -> Result<ChannelView, ChannelError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;

        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(request.platform.as_str())
            .to_string();
        let auth_token = match request
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(token) => Some(self.cipher.seal(token)?),
            None => None,
        };

        let created = self
            .channels
            .insert_channel(&NewChannel {
                workspace_id,
                user_id: actor_id,
                name,
                platform: request.platform,
                auth_token,
            })
            .await?
            .ok_or(ChannelError::Conflict)?;

        info!(%workspace_id, channel_id = %created.id, platform = %created.platform, "channel created");
        Ok(ChannelView::from(&created))
    }

    pub async fn delete_channel(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        channel_id: Uuid,
    ) -> Result<(), ChannelError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;
        if !self.channels.delete_channel(workspace_id, channel_id).await? {
            return Err(ChannelError::NotFound);
        }
        info!(%workspace_id, %channel_id, "channel deleted");
        Ok(())
    }

    pub async fn disconnect(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        channel_id: Uuid,
    ) -> Result<ChannelView, ChannelError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;
        let channel = self
            .channels
            .set_auth_token(workspace_id, channel_id, None, false)
            .await?
            .ok_or(ChannelError::NotFound)?;
        info!(%workspace_id, %channel_id, "channel disconnected");
        Ok(ChannelView::from(&channel))
    }

    pub async fn refresh(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        channel_id: Uuid,
        auth_token: &str,
    ) -> Result<ChannelView, ChannelError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;
        let token = auth_token.trim();
        if token.is_empty() {
            return Err(ChannelError::Validation("authToken is required".into()));
        }
        let sealed = self.cipher.seal(token)?;
        let channel = self
            .channels
            .set_auth_token(workspace_id, channel_id, Some(&sealed), true)
            .await?
            .ok_or(ChannelError::NotFound)?;
        info!(%workspace_id, %channel_id, "channel token refreshed");
        Ok(ChannelView::from(&channel))
    }

    /// Probes the stored token against the platform and persists what it finds.
    pub async fn check_token_status(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        channel_id: Uuid,
    ) -> Result<TokenStatusReport, ChannelError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        let channel = self
            .channels
            .find_channel(workspace_id, channel_id)
            .await?
            .ok_or(ChannelError::NotFound)?;

        let token = match channel.auth_token.as_deref() {
            None => {
                return self
                    .record_validity(&channel, false, false, Some("No token stored".into()))
                    .await
            }
            Some(sealed) => match self.cipher.open(sealed) {
                Ok(token) => token,
                Err(err) => {
                    error!(?err, %channel_id, "stored channel token could not be decrypted");
                    return self
                        .record_validity(
                            &channel,
                            false,
                            false,
                            Some("Stored token could not be read".into()),
                        )
                        .await;
                }
            },
        };

        let adapter = self.platforms.adapter(channel.platform);
        match adapter.check_token(&token).await {
            Ok(TokenStatus::Valid) => self.record_validity(&channel, true, true, None).await,
            Ok(TokenStatus::Invalid { status, message }) => {
                warn!(%channel_id, status, "channel token rejected by platform");
                self.record_validity(&channel, false, true, Some(message))
                    .await
            }
            Ok(TokenStatus::Unchecked) => Ok(TokenStatusReport {
                channel_id: channel.id,
                platform: channel.platform,
                is_valid: channel.is_valid,
                checked: false,
                message: None,
            }),
            Err(err) => {
                warn!(%channel_id, error = %err, "token check could not reach platform");
                Err(ChannelError::Upstream(err))
            }
        }
    }

    async fn record_validity(
        &self,
        channel: &Channel,
        is_valid: bool,
        checked: bool,
        message: Option<String>,
    ) -> Result<TokenStatusReport, ChannelError> {
        if channel.is_valid != is_valid {
            self.channels
                .set_validity(channel.workspace_id, channel.id, is_valid)
                .await?;
        }
        Ok(TokenStatusReport {
            channel_id: channel.id,
            platform: channel.platform,
            is_valid,
            checked,
            message,
        })
    }
}
