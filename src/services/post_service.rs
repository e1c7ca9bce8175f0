use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, Time};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{channel_repository::ChannelRepository, post_repository::PostRepository};
use crate::models::channel::{Channel, Platform};
use crate::models::post::{
    double_option, DateRange, MediaRef, NewPost, Page, Post, PostChanges, PostChannelView,
    PostFilter, PostStatus, PostView, StatusFilter,
};
use crate::responses::ApiError;
use crate::services::platforms::{
    PlatformAdapter, PlatformRegistry, PublishMedia, PublishOutcome, PublishRequest,
};
use crate::services::storage::{
    content_type_for, validate_key, ContentStorage, StorageError, MEDIA_DIR,
};
use crate::services::workspace_policy::{AccessError, WorkspacePolicy};
use crate::utils::encryption::TokenCipher;

#[derive(Debug, Error)]
pub enum PostError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("{0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError for PostError {
    fn status(&self) -> StatusCode {
        match self {
            PostError::Validation(_) => StatusCode::BAD_REQUEST,
            PostError::Access(err) => err.status(),
            PostError::NotFound(_) => StatusCode::NOT_FOUND,
            PostError::Storage(StorageError::InvalidKey) => StatusCode::BAD_REQUEST,
            PostError::Storage(StorageError::NotFound) => StatusCode::NOT_FOUND,
            PostError::Storage(StorageError::Io(_)) | PostError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn post_not_found() -> PostError {
    PostError::NotFound("Post not found".into())
}

fn idea_not_found() -> PostError {
    PostError::NotFound("Idea not found".into())
}

/// A target channel. Only `id` is used for resolution; `name` is display data.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelRef {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_post_status() -> PostStatus {
    PostStatus::Draft
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_key: Option<String>,
    #[serde(default)]
    pub media_name: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default = "default_post_status")]
    pub status: PostStatus,
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default, alias = "channelsArray")]
    pub channels: Vec<ChannelRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub content: Option<String>,
    /// `null` detaches the media.
    #[serde(default, deserialize_with = "double_option")]
    pub media_key: Option<Option<String>>,
    #[serde(default)]
    pub media_name: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_at: Option<Option<String>>,
    #[serde(default, alias = "channelsArray")]
    pub channels: Option<Vec<ChannelRef>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub media_key: Option<Option<String>>,
    #[serde(default)]
    pub media_name: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_at: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// Comma separated.
    #[serde(default)]
    pub channel_ids: Option<String>,
}

impl PostQuery {
    pub fn to_filter(&self) -> Result<PostFilter, PostError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => StatusFilter::All,
            Some(raw) => raw.parse().map_err(PostError::Validation)?,
        };

        let date_range = match (non_empty(&self.start_date), non_empty(&self.end_date)) {
            (Some(start), Some(end)) => {
                let range = DateRange {
                    start: parse_bound(start, false)?,
                    end: parse_bound(end, true)?,
                };
                if range.start > range.end {
                    return Err(PostError::Validation(
                        "startDate must not be after endDate".into(),
                    ));
                }
                Some(range)
            }
            _ => None,
        };

        let channel_ids = match non_empty(&self.channel_ids) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(id)
                        .map_err(|_| PostError::Validation(format!("Invalid channel id: {}", id)))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(PostFilter {
            status,
            date_range,
            channel_ids,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates, which cover the whole day.
fn parse_bound(value: &str, end_of_day: bool) -> Result<OffsetDateTime, PostError> {
    if let Ok(at) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(at);
    }
    let invalid = || PostError::Validation(format!("Invalid date: {}", value));
    let format = time::format_description::parse("[year]-[month]-[day]").map_err(|_| invalid())?;
    let date = Date::parse(value, &format).map_err(|_| invalid())?;
    let time = if end_of_day {
        Time::from_hms_milli(23, 59, 59, 999).map_err(|_| invalid())?
    } else {
        Time::MIDNIGHT
    };
    Ok(date.with_time(time).assume_utc())
}

fn parse_timestamp(value: &str) -> Result<OffsetDateTime, PostError> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map_err(|_| PostError::Validation(format!("Invalid scheduledAt: {}", value)))
}

fn parse_optional_timestamp(value: Option<&str>) -> Result<Option<OffsetDateTime>, PostError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => parse_timestamp(raw).map(Some),
        None => Ok(None),
    }
}

fn media_ref(
    key: &str,
    name: Option<String>,
    content_type: Option<String>,
) -> Result<Option<MediaRef>, PostError> {
    let key = key.trim();
    if key.is_empty() {
        return Ok(None);
    }
    validate_key(key).map_err(|_| PostError::Validation("Invalid media key".into()))?;
    Ok(Some(MediaRef {
        key: key.to_string(),
        name,
        content_type: content_type.or_else(|| Some(content_type_for(key).to_string())),
    }))
}

/// Platforms that refuse text-only posts need media on every target.
fn check_media_rule(channels: &[Channel], has_media: bool) -> Result<(), PostError> {
    if has_media {
        return Ok(());
    }
    let mut needing: Vec<Platform> = channels
        .iter()
        .map(|c| c.platform)
        .filter(|p| p.requires_media())
        .collect();
    needing.sort_by_key(|p| p.as_str());
    needing.dedup();
    if needing.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = needing.iter().map(|p| p.as_str()).collect();
    Err(PostError::Validation(format!(
        "Media is required for {} channels",
        names.join("/")
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub channel_id: Uuid,
    pub channel_name: String,
    pub platform: Platform,
    pub status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PublishResult {
    fn new(channel: &Channel, status: PublishStatus) -> Self {
        Self {
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            platform: channel.platform,
            status,
            external_id: None,
            code: None,
            message: None,
        }
    }

    fn failed(channel: &Channel, code: &str, message: String) -> Self {
        Self {
            code: Some(code.to_string()),
            message: Some(message),
            ..Self::new(channel, PublishStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithResults {
    pub post: PostView,
    pub publish_results: Vec<PublishResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedMedia {
    pub media_key: String,
    pub media_url: String,
    pub media_name: Option<String>,
    pub media_type: String,
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    channels: Arc<dyn ChannelRepository>,
    policy: WorkspacePolicy,
    storage: Arc<dyn ContentStorage>,
    platforms: PlatformRegistry,
    cipher: TokenCipher,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        channels: Arc<dyn ChannelRepository>,
        policy: WorkspacePolicy,
        storage: Arc<dyn ContentStorage>,
        platforms: PlatformRegistry,
        cipher: TokenCipher,
    ) -> Self {
        Self {
            posts,
            channels,
            policy,
            storage,
            platforms,
            cipher,
        }
    }

    /// Resolves channel refs by id inside the workspace. Unknown ids are a client error.
    async fn resolve_channels(
        &self,
        workspace_id: Uuid,
        refs: &[ChannelRef],
    ) -> Result<Vec<Channel>, PostError> {
        if refs.is_empty() {
            return Err(PostError::Validation(
                "At least one channel is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = refs
            .iter()
            .map(|r| r.id)
            .filter(|id| seen.insert(*id))
            .collect();

        let found = self
            .channels
            .find_channels_by_ids(workspace_id, &ids)
            .await?;
        let mut by_id: HashMap<Uuid, Channel> = found.into_iter().map(|c| (c.id, c)).collect();

        ids.iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .ok_or_else(|| PostError::Validation(format!("Unknown channel: {}", id)))
            })
            .collect()
    }

    pub async fn create_post(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        request: CreatePostRequest,
    ) -> Result<PostWithResults, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;

        if request.status == PostStatus::Idea {
            return Err(PostError::Validation(
                "Use the ideas endpoint to create an idea".into(),
            ));
        }
        let channels = self
            .resolve_channels(workspace_id, &request.channels)
            .await?;
        let media = match request.media_key.as_deref() {
            Some(key) => media_ref(key, request.media_name, request.media_type)?,
            None => None,
        };
        check_media_rule(&channels, media.is_some())?;
        if request.content.trim().is_empty() && media.is_none() {
            return Err(PostError::Validation("Post content cannot be empty".into()));
        }
        let scheduled_at = parse_optional_timestamp(request.scheduled_at.as_deref())?;

        let channel_ids: Vec<Uuid> = channels.iter().map(|c| c.id).collect();
        let post = self
            .posts
            .create_post(
                &NewPost {
                    workspace_id,
                    user_id: actor_id,
                    content: request.content,
                    media,
                    status: request.status,
                    scheduled_at,
                },
                &channel_ids,
            )
            .await?;
        info!(%workspace_id, post_id = %post.id, status = post.status.as_str(), "post created");

        let publish_results = if post.status == PostStatus::Published {
            self.fan_out(&post, &channels).await
        } else {
            Vec::new()
        };

        Ok(PostWithResults {
            post: self.view(post).await?,
            publish_results,
        })
    }

    pub async fn update_post(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        post_id: Uuid,
        request: UpdatePostRequest,
    ) -> Result<PostWithResults, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;

        let current = self
            .posts
            .find_post(workspace_id, post_id)
            .await?
            .filter(|p| p.status != PostStatus::Idea)
            .ok_or_else(post_not_found)?;
        if request.status == Some(PostStatus::Idea) {
            return Err(PostError::Validation(
                "Use the ideas endpoint to manage ideas".into(),
            ));
        }

        let linked: Vec<Uuid> = self
            .posts
            .channels_for_posts(&[post_id])
            .await?
            .into_iter()
            .map(|row| row.channel_id)
            .collect();

        let targets = match &request.channels {
            Some(refs) => self.resolve_channels(workspace_id, refs).await?,
            None => self.channels.find_channels_by_ids(workspace_id, &linked).await?,
        };

        let changes = PostChanges {
            content: request.content,
            media: match request.media_key {
                Some(Some(key)) => Some(media_ref(&key, request.media_name, request.media_type)?),
                Some(None) => Some(None),
                None => None,
            },
            status: request.status,
            scheduled_at: match request.scheduled_at {
                Some(value) => Some(parse_optional_timestamp(value.as_deref())?),
                None => None,
            },
        };
        check_media_rule(&targets, changes.resulting_has_media(&current))?;

        let target_ids: Vec<Uuid> = targets.iter().map(|c| c.id).collect();
        let add: Vec<Uuid> = target_ids
            .iter()
            .filter(|id| !linked.contains(id))
            .copied()
            .collect();
        let remove: Vec<Uuid> = linked
            .iter()
            .filter(|id| !target_ids.contains(id))
            .copied()
            .collect();

        let updated = self
            .posts
            .update_post(workspace_id, post_id, &changes, &add, &remove)
            .await?
            .ok_or_else(post_not_found)?;
        info!(
            %workspace_id,
            %post_id,
            added = add.len(),
            removed = remove.len(),
            "post updated"
        );

        let publish_results = if updated.status == PostStatus::Published
            && current.status != PostStatus::Published
        {
            self.fan_out(&updated, &targets).await
        } else {
            Vec::new()
        };

        Ok(PostWithResults {
            post: self.view(updated).await?,
            publish_results,
        })
    }

    pub async fn get_posts(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        filter: &PostFilter,
    ) -> Result<Vec<PostView>, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        let posts = self.posts.filter_posts(workspace_id, filter).await?;
        self.views(posts).await
    }

    pub async fn get_post(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        post_id: Uuid,
    ) -> Result<PostView, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        let post = self
            .posts
            .find_post(workspace_id, post_id)
            .await?
            .ok_or_else(post_not_found)?;
        self.view(post).await
    }

    pub async fn delete_post(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        post_id: Uuid,
    ) -> Result<(), PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        if !self.posts.soft_delete_post(workspace_id, post_id).await? {
            return Err(post_not_found());
        }
        info!(%workspace_id, %post_id, "post deleted");
        Ok(())
    }

    pub async fn list_drafts(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        page: Page,
    ) -> Result<Vec<PostView>, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        let posts = self
            .posts
            .list_posts_by_status(workspace_id, PostStatus::Draft, false, page)
            .await?;
        self.views(posts).await
    }

    pub async fn create_idea(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        request: IdeaRequest,
    ) -> Result<PostView, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;

        let media = match request.media_key.flatten() {
            Some(key) => media_ref(&key, request.media_name, request.media_type)?,
            None => None,
        };
        let content = request.content.unwrap_or_default();
        if content.trim().is_empty() && media.is_none() {
            return Err(PostError::Validation("Idea content cannot be empty".into()));
        }
        let scheduled_at = parse_optional_timestamp(request.scheduled_at.flatten().as_deref())?;

        let idea = self
            .posts
            .create_post(
                &NewPost {
                    workspace_id,
                    user_id: actor_id,
                    content,
                    media,
                    status: PostStatus::Idea,
                    scheduled_at,
                },
                &[],
            )
            .await?;
        info!(%workspace_id, idea_id = %idea.id, "idea created");
        self.view(idea).await
    }

    pub async fn update_idea(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        idea_id: Uuid,
        request: IdeaRequest,
    ) -> Result<PostView, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        self.find_idea(workspace_id, idea_id).await?;

        let changes = PostChanges {
            content: request.content,
            media: match request.media_key {
                Some(Some(key)) => Some(media_ref(&key, request.media_name, request.media_type)?),
                Some(None) => Some(None),
                None => None,
            },
            status: Some(PostStatus::Idea),
            scheduled_at: match request.scheduled_at {
                Some(value) => Some(parse_optional_timestamp(value.as_deref())?),
                None => None,
            },
        };

        let updated = self
            .posts
            .update_post(workspace_id, idea_id, &changes, &[], &[])
            .await?
            .ok_or_else(idea_not_found)?;
        self.view(updated).await
    }

    pub async fn delete_idea(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        idea_id: Uuid,
    ) -> Result<(), PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        self.find_idea(workspace_id, idea_id).await?;
        if !self.posts.soft_delete_post(workspace_id, idea_id).await? {
            return Err(idea_not_found());
        }
        info!(%workspace_id, %idea_id, "idea deleted");
        Ok(())
    }

    pub async fn list_ideas(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        page: Page,
    ) -> Result<Vec<PostView>, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        let ideas = self
            .posts
            .list_posts_by_status(workspace_id, PostStatus::Idea, true, page)
            .await?;
        self.views(ideas).await
    }

    async fn find_idea(&self, workspace_id: Uuid, idea_id: Uuid) -> Result<Post, PostError> {
        self.posts
            .find_post(workspace_id, idea_id)
            .await?
            .filter(|p| p.status == PostStatus::Idea)
            .ok_or_else(idea_not_found)
    }

    pub async fn upload_media(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        file_name: Option<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<UploadedMedia, PostError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        if bytes.is_empty() {
            return Err(PostError::Validation("File is empty".into()));
        }
        let extension = file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string());
        let size = bytes.len();
        let key = self
            .storage
            .store(MEDIA_DIR, extension.as_deref(), bytes)
            .await?;
        let media_url = self.storage.signed_url(&key)?;
        info!(%workspace_id, media_key = %key, size, "media uploaded");

        Ok(UploadedMedia {
            media_type: content_type
                .filter(|ct| !ct.trim().is_empty())
                .unwrap_or_else(|| content_type_for(&key).to_string()),
            media_key: key,
            media_url,
            media_name: file_name,
        })
    }

    async fn view(&self, post: Post) -> Result<PostView, PostError> {
        let mut views = self.views(vec![post]).await?;
        views.pop().ok_or_else(post_not_found)
    }

    async fn views(&self, posts: Vec<Post>) -> Result<Vec<PostView>, PostError> {
        let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let mut channels: HashMap<Uuid, Vec<PostChannelView>> = HashMap::new();
        if !ids.is_empty() {
            for row in self.posts.channels_for_posts(&ids).await? {
                channels.entry(row.post_id).or_default().push(PostChannelView {
                    id: row.channel_id,
                    name: row.name,
                    platform: row.platform,
                });
            }
        }

        Ok(posts
            .into_iter()
            .map(|post| {
                let media_url = post.media_key.as_deref().and_then(|key| {
                    self.storage
                        .signed_url(key)
                        .map_err(|err| warn!(post_id = %post.id, error = %err, "could not sign media url"))
                        .ok()
                });
                let linked = channels.remove(&post.id).unwrap_or_default();
                PostView::new(post, linked, media_url)
            })
            .collect())
    }

    /// Dispatches the committed post to every channel concurrently. Each channel
    /// reports its own outcome; nothing here fails the surrounding request.
    ///
    /// The dispatch runs in its own task so a client that disconnects mid-request
    /// does not abort publishes that are already in flight.
    async fn fan_out(&self, post: &Post, channels: &[Channel]) -> Vec<PublishResult> {
        let media = post.media_key.as_ref().map(|key| PublishMedia {
            key: key.clone(),
            content_type: post
                .media_type
                .clone()
                .unwrap_or_else(|| content_type_for(key).to_string()),
        });

        let jobs: Vec<_> = channels
            .iter()
            .map(|channel| {
                let adapter = self.platforms.adapter(channel.platform);
                // Stubs never read the token.
                let token = if self.platforms.is_live(channel.platform) {
                    self.channel_token(channel)
                } else {
                    Ok(String::new())
                };
                (adapter, channel.clone(), token)
            })
            .collect();
        let post_id = post.id;
        let content = post.content.clone();

        let dispatch = tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            let channels: Vec<Channel> = jobs
                .iter()
                .map(|(_, channel, _)| channel.clone())
                .collect();
            for (index, (adapter, channel, token)) in jobs.into_iter().enumerate() {
                let content = content.clone();
                let media = media.clone();
                tasks.spawn(async move {
                    let result = publish_to_channel(adapter, &channel, token, content, media).await;
                    (index, result)
                });
            }

            let mut results: Vec<Option<PublishResult>> = vec![None; channels.len()];
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result)) => results[index] = Some(result),
                    Err(err) => error!(?err, %post_id, "publish task aborted"),
                }
            }

            let results: Vec<PublishResult> = results
                .into_iter()
                .zip(&channels)
                .map(|(result, channel)| result.unwrap_or_else(|| aborted(channel)))
                .collect();
            let count =
                |status: PublishStatus| results.iter().filter(|r| r.status == status).count();
            info!(
                %post_id,
                published = count(PublishStatus::Published),
                skipped = count(PublishStatus::Skipped),
                failed = count(PublishStatus::Failed),
                "publish fan-out finished"
            );
            results
        });

        match dispatch.await {
            Ok(results) => results,
            Err(err) => {
                error!(?err, post_id = %post.id, "publish dispatch aborted");
                channels.iter().map(aborted).collect()
            }
        }
    }

    fn channel_token(&self, channel: &Channel) -> Result<String, (&'static str, String)> {
        let sealed = channel.auth_token.as_deref().ok_or((
            "channel_not_connected",
            "Channel has no stored token".to_string(),
        ))?;
        self.cipher.open(sealed).map_err(|err| {
            error!(?err, channel_id = %channel.id, "stored channel token could not be decrypted");
            ("token_unreadable", "Stored token could not be read".to_string())
        })
    }
}

fn aborted(channel: &Channel) -> PublishResult {
    PublishResult::failed(
        channel,
        "publish_aborted",
        "Publishing was interrupted".into(),
    )
}

async fn publish_to_channel(
    adapter: Arc<dyn PlatformAdapter>,
    channel: &Channel,
    token: Result<String, (&'static str, String)>,
    content: String,
    media: Option<PublishMedia>,
) -> PublishResult {
    let access_token = match token {
        Ok(token) => token,
        Err((code, message)) => {
            warn!(channel_id = %channel.id, code, "skipping publish for channel without usable token");
            return PublishResult::failed(channel, code, message);
        }
    };

    let request = PublishRequest {
        channel_id: channel.id,
        access_token,
        content,
        media,
    };
    match adapter.publish(request).await {
        Ok(PublishOutcome::Published { external_id }) => {
            info!(channel_id = %channel.id, platform = %channel.platform, "published to channel");
            PublishResult {
                external_id,
                ..PublishResult::new(channel, PublishStatus::Published)
            }
        }
        Ok(PublishOutcome::Skipped { reason }) => PublishResult {
            message: Some(reason),
            ..PublishResult::new(channel, PublishStatus::Skipped)
        },
        Err(err) => {
            let failure = err.to_failure();
            warn!(
                channel_id = %channel.id,
                platform = %channel.platform,
                code = %failure.code,
                error = %err,
                "publish to channel failed"
            );
            PublishResult::failed(channel, &failure.code, failure.message)
        }
    }
}
