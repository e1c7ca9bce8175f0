use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::post::{
    NewPost, Page, Post, PostChanges, PostChannelRow, PostFilter, PostStatus, StatusFilter,
};

use super::post_repository::PostRepository;

const POST_COLUMNS: &str = "id, workspace_id, user_id, content, media_key, media_name, media_type, \
     status, scheduled_at, deleted_at, created_at, updated_at";

pub struct PostgresPostRepository {
    pub pool: PgPool,
}

#[async_trait]
impl PostRepository for PostgresPostRepository {
    async fn create_post(
        &self,
        post: &NewPost,
        channel_ids: &[Uuid],
    ) -> Result<Post, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let media = post.media.as_ref();
        let sql = format!(
            "INSERT INTO posts (workspace_id, user_id, content, media_key, media_name, media_type,
                                status, scheduled_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
             RETURNING {POST_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Post>(&sql)
            .bind(post.workspace_id)
            .bind(post.user_id)
            .bind(&post.content)
            .bind(media.map(|m| m.key.as_str()))
            .bind(media.and_then(|m| m.name.as_deref()))
            .bind(media.and_then(|m| m.content_type.as_deref()))
            .bind(post.status)
            .bind(post.scheduled_at)
            .fetch_one(&mut *tx)
            .await?;

        if !channel_ids.is_empty() {
            sqlx::query(
                "INSERT INTO post_channels (post_id, channel_id)
                 SELECT $1, unnest($2::uuid[])
                 ON CONFLICT DO NOTHING",
            )
            .bind(created.id)
            .bind(channel_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn find_post(
        &self,
        workspace_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<Post>, sqlx::Error> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE id = $1 AND workspace_id = $2 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn channels_for_posts(
        &self,
        post_ids: &[Uuid],
    ) -> Result<Vec<PostChannelRow>, sqlx::Error> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, PostChannelRow>(
            r#"
            SELECT pc.post_id, pc.channel_id, c.name, c.platform
            FROM post_channels pc
            JOIN channels c ON c.id = pc.channel_id
            WHERE pc.post_id = ANY($1)
            ORDER BY pc.created_at ASC
            "#,
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_post(
        &self,
        workspace_id: Uuid,
        post_id: Uuid,
        changes: &PostChanges,
        add_channels: &[Uuid],
        remove_channels: &[Uuid],
    ) -> Result<Option<Post>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let media = changes.media.as_ref().and_then(|m| m.as_ref());
        let sql = format!(
            "UPDATE posts
             SET content = COALESCE($3, content),
                 media_key = CASE WHEN $4 THEN $5 ELSE media_key END,
                 media_name = CASE WHEN $4 THEN $6 ELSE media_name END,
                 media_type = CASE WHEN $4 THEN $7 ELSE media_type END,
                 status = COALESCE($8, status),
                 scheduled_at = CASE WHEN $9 THEN $10 ELSE scheduled_at END,
                 updated_at = now()
             WHERE id = $1 AND workspace_id = $2 AND deleted_at IS NULL
             RETURNING {POST_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .bind(workspace_id)
            .bind(changes.content.as_deref())
            .bind(changes.media.is_some())
            .bind(media.map(|m| m.key.as_str()))
            .bind(media.and_then(|m| m.name.as_deref()))
            .bind(media.and_then(|m| m.content_type.as_deref()))
            .bind(changes.status)
            .bind(changes.scheduled_at.is_some())
            .bind(changes.scheduled_at.flatten())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(updated) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        if !remove_channels.is_empty() {
            sqlx::query("DELETE FROM post_channels WHERE post_id = $1 AND channel_id = ANY($2)")
                .bind(post_id)
                .bind(remove_channels)
                .execute(&mut *tx)
                .await?;
        }

        if !add_channels.is_empty() {
            sqlx::query(
                "INSERT INTO post_channels (post_id, channel_id)
                 SELECT $1, unnest($2::uuid[])
                 ON CONFLICT DO NOTHING",
            )
            .bind(post_id)
            .bind(add_channels)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn soft_delete_post(
        &self,
        workspace_id: Uuid,
        post_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE posts SET deleted_at = now(), updated_at = now()
             WHERE id = $1 AND workspace_id = $2 AND deleted_at IS NULL",
        )
        .bind(post_id)
        .bind(workspace_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn filter_posts(
        &self,
        workspace_id: Uuid,
        filter: &PostFilter,
    ) -> Result<Vec<Post>, sqlx::Error> {
        let status = match filter.status {
            StatusFilter::All => None,
            StatusFilter::Only(status) => Some(status),
        };
        let (start, end) = match &filter.date_range {
            Some(range) => (Some(range.start), Some(range.end)),
            None => (None, None),
        };

        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p
             WHERE p.workspace_id = $1
               AND p.deleted_at IS NULL
               AND (($2::post_status IS NULL AND p.status <> 'IDEA') OR p.status = $2)
               AND ($3::timestamptz IS NULL
                    OR p.scheduled_at BETWEEN $3 AND $4
                    OR p.created_at BETWEEN $3 AND $4)
               AND (cardinality($5::uuid[]) = 0 OR EXISTS (
                    SELECT 1 FROM post_channels pc
                    WHERE pc.post_id = p.id AND pc.channel_id = ANY($5)))
             ORDER BY p.created_at DESC"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(workspace_id)
            .bind(status)
            .bind(start)
            .bind(end)
            .bind(&filter.channel_ids)
            .fetch_all(&self.pool)
            .await
    }

    async fn list_posts_by_status(
        &self,
        workspace_id: Uuid,
        status: PostStatus,
        unscheduled_only: bool,
        page: Page,
    ) -> Result<Vec<Post>, sqlx::Error> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE workspace_id = $1
               AND status = $2
               AND deleted_at IS NULL
               AND (NOT $3 OR scheduled_at IS NULL)
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(workspace_id)
            .bind(status)
            .bind(unscheduled_only)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
    }
}
