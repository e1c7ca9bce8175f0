use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Unverified accounts older than this are frozen until they verify.
pub const UNVERIFIED_GRACE_PERIOD: Duration = Duration::days(3);

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn is_frozen(&self, now: OffsetDateTime) -> bool {
        !self.is_verified && now - self.created_at > UNVERIFIED_GRACE_PERIOD
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_verified: bool,
    pub is_freeze: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PublicUser {
    pub fn from_user(user: &User, now: OffsetDateTime) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            is_verified: user.is_verified,
            is_freeze: user.is_frozen(now),
            created_at: user.created_at,
        }
    }
}
