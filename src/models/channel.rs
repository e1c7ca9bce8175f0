use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "social_platform", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Linkedin,
    Instagram,
    Twitter,
    Tiktok,
    Facebook,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Linkedin,
        Platform::Instagram,
        Platform::Twitter,
        Platform::Tiktok,
        Platform::Facebook,
        Platform::Youtube,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Linkedin => "LINKEDIN",
            Platform::Instagram => "INSTAGRAM",
            Platform::Twitter => "TWITTER",
            Platform::Tiktok => "TIKTOK",
            Platform::Facebook => "FACEBOOK",
            Platform::Youtube => "YOUTUBE",
        }
    }

    /// Platforms that refuse text-only posts.
    pub fn requires_media(self) -> bool {
        matches!(self, Platform::Tiktok | Platform::Instagram)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("Unsupported platform: {}", value))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub platform: Platform,
    /// AES-GCM ciphertext, never the raw token.
    pub auth_token: Option<String>,
    pub is_valid: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub platform: Platform,
    pub auth_token: Option<String>,
}

/// Channel as exposed over the API. The token never leaves the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub platform: Platform,
    pub has_token: bool,
    pub is_valid: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Channel> for ChannelView {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id,
            workspace_id: channel.workspace_id,
            user_id: channel.user_id,
            name: channel.name.clone(),
            platform: channel.platform,
            has_token: channel.auth_token.is_some(),
            is_valid: channel.is_valid,
            created_at: channel.created_at,
            updated_at: channel.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_platform_names_case_insensitively() {
        assert_eq!("linkedin".parse::<Platform>(), Ok(Platform::Linkedin));
        assert_eq!(" TikTok ".parse::<Platform>(), Ok(Platform::Tiktok));
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn media_is_required_for_tiktok_and_instagram_only() {
        let requiring: Vec<_> = Platform::ALL
            .into_iter()
            .filter(|p| p.requires_media())
            .collect();
        assert_eq!(requiring, vec![Platform::Instagram, Platform::Tiktok]);
    }

    #[test]
    fn view_hides_token() {
        let now = OffsetDateTime::now_utc();
        let channel = Channel {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "LINKEDIN".into(),
            platform: Platform::Linkedin,
            auth_token: Some("ciphertext".into()),
            is_valid: true,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(ChannelView::from(&channel)).unwrap();
        assert_eq!(value["hasToken"], true);
        assert!(value.get("authToken").is_none());
        assert_eq!(value["platform"], "LINKEDIN");
    }
}
