use async_trait::async_trait;
use uuid::Uuid;

use crate::models::post::{
    NewPost, Page, Post, PostChanges, PostChannelRow, PostFilter, PostStatus,
};

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Inserts the post and its channel links in one transaction.
    async fn create_post(&self, post: &NewPost, channel_ids: &[Uuid])
        -> Result<Post, sqlx::Error>;

    /// Soft-deleted posts are invisible.
    async fn find_post(&self, workspace_id: Uuid, post_id: Uuid)
        -> Result<Option<Post>, sqlx::Error>;

    async fn channels_for_posts(&self, post_ids: &[Uuid])
        -> Result<Vec<PostChannelRow>, sqlx::Error>;

    /// Applies field changes and the channel diff atomically.
    async fn update_post(
        &self,
        workspace_id: Uuid,
        post_id: Uuid,
        changes: &PostChanges,
        add_channels: &[Uuid],
        remove_channels: &[Uuid],
    ) -> Result<Option<Post>, sqlx::Error>;

    async fn soft_delete_post(&self, workspace_id: Uuid, post_id: Uuid)
        -> Result<bool, sqlx::Error>;

    async fn filter_posts(
        &self,
        workspace_id: Uuid,
        filter: &PostFilter,
    ) -> Result<Vec<Post>, sqlx::Error>;

    /// Newest first. `unscheduled_only` restricts to rows without `scheduled_at`.
    async fn list_posts_by_status(
        &self,
        workspace_id: Uuid,
        status: PostStatus,
        unscheduled_only: bool,
        page: Page,
    ) -> Result<Vec<Post>, sqlx::Error>;
}
