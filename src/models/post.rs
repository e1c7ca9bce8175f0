use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, Type};
use time::OffsetDateTime;
use uuid::Uuid;

use super::channel::Platform;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "post_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PostStatus {
    Idea,
    Draft,
    Published,
    Scheduled,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Idea => "IDEA",
            PostStatus::Draft => "DRAFT",
            PostStatus::Published => "PUBLISHED",
            PostStatus::Scheduled => "SCHEDULED",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IDEA" => Ok(PostStatus::Idea),
            "DRAFT" => Ok(PostStatus::Draft),
            "PUBLISHED" => Ok(PostStatus::Published),
            "SCHEDULED" => Ok(PostStatus::Scheduled),
            other => Err(format!("Unknown post status: {}", other)),
        }
    }
}

/// `ALL` means every status except IDEA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(PostStatus),
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("ALL") {
            Ok(StatusFilter::All)
        } else {
            value.parse().map(StatusFilter::Only)
        }
    }
}

impl StatusFilter {
    pub fn matches(self, status: PostStatus) -> bool {
        match self {
            StatusFilter::All => status != PostStatus::Idea,
            StatusFilter::Only(wanted) => status == wanted,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub media_key: Option<String>,
    pub media_name: Option<String>,
    pub media_type: Option<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<OffsetDateTime>,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Post {
    pub fn has_media(&self) -> bool {
        self.media_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaRef {
    pub key: String,
    pub name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub media: Option<MediaRef>,
    pub status: PostStatus,
    pub scheduled_at: Option<OffsetDateTime>,
}

/// Field-level update. `None` leaves the column untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub content: Option<String>,
    pub media: Option<Option<MediaRef>>,
    pub status: Option<PostStatus>,
    pub scheduled_at: Option<Option<OffsetDateTime>>,
}

impl PostChanges {
    /// Media attached once these changes are applied on top of `post`.
    pub fn resulting_has_media(&self, post: &Post) -> bool {
        match &self.media {
            Some(Some(media)) => !media.key.trim().is_empty(),
            Some(None) => false,
            None => post.has_media(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PostChannelRow {
    pub post_id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostChannelView {
    pub id: Uuid,
    pub name: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub content: String,
    /// Short-lived signed URL, present whenever `media_key` is.
    pub media_url: Option<String>,
    pub media_key: Option<String>,
    pub media_name: Option<String>,
    pub media_type: Option<String>,
    pub status: PostStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub user_id: Uuid,
    pub work_space_id: Uuid,
    pub channels: Vec<PostChannelView>,
}

impl PostView {
    pub fn new(post: Post, channels: Vec<PostChannelView>, media_url: Option<String>) -> Self {
        Self {
            id: post.id,
            content: post.content,
            media_url,
            media_key: post.media_key,
            media_name: post.media_name,
            media_type: post.media_type,
            status: post.status,
            scheduled_at: post.scheduled_at,
            created_at: post.created_at,
            updated_at: post.updated_at,
            user_id: post.user_id,
            work_space_id: post.workspace_id,
            channels,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl DateRange {
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct PostFilter {
    pub status: StatusFilter,
    pub date_range: Option<DateRange>,
    pub channel_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .min(MAX_PAGE_LIMIT),
            offset: offset.filter(|o| *o > 0).unwrap_or(0),
        }
    }
}

/// Distinguishes an absent field from an explicit `null`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
