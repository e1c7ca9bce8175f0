use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// How long an invitation stays acceptable after it was last sent.
pub const INVITE_TTL: Duration = Duration::days(7);

pub const DEFAULT_TIME_ZONE: &str = "UTC";
pub const DEFAULT_TIME_ZONE_OFFSET: &str = "0";
pub const DEFAULT_START_DAY: &str = "Sunday";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "workspace_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkspaceRole {
    Creator,
    Admin,
    Member,
}

impl WorkspaceRole {
    pub fn is_admin(self) -> bool {
        matches!(self, WorkspaceRole::Creator | WorkspaceRole::Admin)
    }

    /// Roles an admin may hand out. CREATOR only exists through signup.
    pub fn is_assignable(self) -> bool {
        matches!(self, WorkspaceRole::Admin | WorkspaceRole::Member)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub time_zone: String,
    pub time_zone_offset: String,
    pub start_day: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub name: String,
    pub time_zone: String,
    pub time_zone_offset: String,
    pub start_day: String,
}

impl NewWorkspace {
    pub fn default_for(username: &str) -> Self {
        Self {
            name: format!("{}'s Workspace", username),
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            time_zone_offset: DEFAULT_TIME_ZONE_OFFSET.to_string(),
            start_day: DEFAULT_START_DAY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub time_zone: Option<String>,
    pub time_zone_offset: Option<String>,
    pub start_day: Option<String>,
}

/// A user's (or pending email's) slot in a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub role: WorkspaceRole,
    pub is_confirmed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Membership {
    /// `updated_at` records when the invite was last (re)sent.
    pub fn invite_sent_at(&self) -> OffsetDateTime {
        self.updated_at.max(self.created_at)
    }

    pub fn invite_expired(&self, now: OffsetDateTime) -> bool {
        now - self.invite_sent_at() > INVITE_TTL
    }
}

/// Uniform projection returned by every membership operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResult {
    pub member_id: Option<Uuid>,
    pub username: Option<String>,
    pub email: String,
    pub role: WorkspaceRole,
    pub is_confirmed: bool,
    pub membership_id: Uuid,
    pub workspace_id: Uuid,
}

impl MemberResult {
    pub fn new(membership: &Membership, username: Option<String>) -> Self {
        Self {
            member_id: membership.user_id,
            username,
            email: membership.email.clone(),
            role: membership.role,
            is_confirmed: membership.is_confirmed,
            membership_id: membership.id,
            workspace_id: membership.workspace_id,
        }
    }
}

/// Row shape for "confirmed members of a workspace", joined with users.
#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub membership_id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub email: String,
    pub role: WorkspaceRole,
    pub is_confirmed: bool,
}

impl From<MemberRow> for MemberResult {
    fn from(row: MemberRow) -> Self {
        Self {
            member_id: row.user_id,
            username: row.username,
            email: row.email,
            role: row.role,
            is_confirmed: row.is_confirmed,
            membership_id: row.membership_id,
            workspace_id: row.workspace_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMembershipSummary {
    pub id: Uuid,
    pub name: String,
    pub time_zone: String,
    pub time_zone_offset: String,
    pub start_day: String,
    pub role: WorkspaceRole,
    pub membership_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub membership_updated_at: OffsetDateTime,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}
