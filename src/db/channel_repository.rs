use async_trait::async_trait;
use uuid::Uuid;

use crate::models::channel::{Channel, NewChannel};

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn list_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>, sqlx::Error>;

    async fn find_channel(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
    ) -> Result<Option<Channel>, sqlx::Error>;

    /// Channels of `workspace_id` among `channel_ids`; foreign ids are silently dropped.
    async fn find_channels_by_ids(
        &self,
        workspace_id: Uuid,
        channel_ids: &[Uuid],
    ) -> Result<Vec<Channel>, sqlx::Error>;

    /// Returns `None` if the name is already used in the workspace.
    async fn insert_channel(&self, channel: &NewChannel) -> Result<Option<Channel>, sqlx::Error>;

    async fn delete_channel(&self, workspace_id: Uuid, channel_id: Uuid)
        -> Result<bool, sqlx::Error>;

    async fn set_auth_token(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
        encrypted_token: Option<&str>,
        is_valid: bool,
    ) -> Result<Option<Channel>, sqlx::Error>;

    async fn set_validity(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
        is_valid: bool,
    ) -> Result<Option<Channel>, sqlx::Error>;
}
