use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::channel::{Channel, NewChannel};

use super::channel_repository::ChannelRepository;

const CHANNEL_COLUMNS: &str =
    "id, workspace_id, user_id, name, platform, auth_token, is_valid, created_at, updated_at";

pub struct PostgresChannelRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ChannelRepository for PostgresChannelRepository {
    async fn list_channels(&self, workspace_id: Uuid) -> Result<Vec<Channel>, sqlx::Error> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE workspace_id = $1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Channel>(&sql)
            .bind(workspace_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn find_channel(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
    ) -> Result<Option<Channel>, sqlx::Error> {
        let sql =
            format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1 AND workspace_id = $2");
        sqlx::query_as::<_, Channel>(&sql)
            .bind(channel_id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_channels_by_ids(
        &self,
        workspace_id: Uuid,
        channel_ids: &[Uuid],
    ) -> Result<Vec<Channel>, sqlx::Error> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE workspace_id = $1 AND id = ANY($2)
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Channel>(&sql)
            .bind(workspace_id)
            .bind(channel_ids)
            .fetch_all(&self.pool)
            .await
    }

    async fn insert_channel(&self, channel: &NewChannel) -> Result<Option<Channel>, sqlx::Error> {
        let sql = format!(
            "INSERT INTO channels (workspace_id, user_id, name, platform, auth_token, is_valid, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, true, now(), now())
             ON CONFLICT (workspace_id, name) DO NOTHING
             RETURNING {CHANNEL_COLUMNS}"
        );
        sqlx::query_as::<_, Channel>(&sql)
            .bind(channel.workspace_id)
            .bind(channel.user_id)
            .bind(&channel.name)
            .bind(channel.platform)
            .bind(channel.auth_token.as_deref())
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_channel(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1 AND workspace_id = $2")
            .bind(channel_id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_auth_token(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
        encrypted_token: Option<&str>,
        is_valid: bool,
    ) -> Result<Option<Channel>, sqlx::Error> {
        let sql = format!(
            "UPDATE channels SET auth_token = $3, is_valid = $4, updated_at = now()
             WHERE id = $1 AND workspace_id = $2
             RETURNING {CHANNEL_COLUMNS}"
        );
        sqlx::query_as::<_, Channel>(&sql)
            .bind(channel_id)
            .bind(workspace_id)
            .bind(encrypted_token)
            .bind(is_valid)
            .fetch_optional(&self.pool)
            .await
    }

    async fn set_validity(
        &self,
        workspace_id: Uuid,
        channel_id: Uuid,
        is_valid: bool,
    ) -> Result<Option<Channel>, sqlx::Error> {
        let sql = format!(
            "UPDATE channels SET is_valid = $3, updated_at = now()
             WHERE id = $1 AND workspace_id = $2
             RETURNING {CHANNEL_COLUMNS}"
        );
        sqlx::query_as::<_, Channel>(&sql)
            .bind(channel_id)
            .bind(workspace_id)
            .bind(is_valid)
            .fetch_optional(&self.pool)
            .await
    }
}
