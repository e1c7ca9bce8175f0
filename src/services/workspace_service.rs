use std::collections::HashSet;
use std::sync::Arc;

use axum::http::StatusCode;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{
    is_unique_violation, user_repository::UserRepository,
    workspace_repository::WorkspaceRepository,
};
use crate::models::post::Page;
use crate::models::user::User;
use crate::models::workspace::{
    is_valid_email, normalize_email, MemberResult, Membership, NewWorkspace, Workspace,
    WorkspaceMembershipSummary, WorkspaceRole, WorkspaceUpdate, INVITE_TTL,
};
use crate::responses::ApiError;
use crate::routes::auth::claims::{InviteClaims, TokenUse};
use crate::services::smtp_mailer::{MailError, MailTemplate, Mailer};
use crate::services::workspace_policy::{AccessError, WorkspacePolicy};
use crate::utils::jwt::JwtSettings;

const WEEK_DAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid or expired invitation")]
    InvalidInvite,
    #[error("Failed to deliver the invitation email")]
    MailDelivery(#[source] MailError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError for WorkspaceError {
    fn status(&self) -> StatusCode {
        match self {
            WorkspaceError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkspaceError::Access(err) => err.status(),
            WorkspaceError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkspaceError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkspaceError::Conflict(_) => StatusCode::CONFLICT,
            WorkspaceError::InvalidInvite => StatusCode::UNAUTHORIZED,
            WorkspaceError::MailDelivery(_) => StatusCode::EXPECTATION_FAILED,
            WorkspaceError::Token(_) | WorkspaceError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            WorkspaceError::MailDelivery(_) => Some("mail_delivery_failed"),
            WorkspaceError::InvalidInvite => Some("invalid_invite"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMember {
    pub email: String,
    pub role: WorkspaceRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteOutcome {
    /// A new pending membership was created and mailed.
    Invited,
    /// An expired pending invite was mailed again.
    Resent,
    /// A live pending invite already exists; nothing was sent.
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InviteFailure {
    pub code: Option<String>,
    pub message: String,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InviteResult {
    pub email: String,
    pub outcome: InviteOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InviteFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedInvite {
    pub workspace_id: Uuid,
    pub member: MemberResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDetails {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub role: WorkspaceRole,
    pub membership_id: Uuid,
}

pub struct WorkspaceService {
    users: Arc<dyn UserRepository>,
    workspaces: Arc<dyn WorkspaceRepository>,
    policy: WorkspacePolicy,
    mailer: Arc<dyn Mailer>,
    jwt: JwtSettings,
    frontend_origin: String,
    invite_locks: Arc<DashMap<(Uuid, String), Arc<Mutex<()>>>>,
}

impl WorkspaceService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        workspaces: Arc<dyn WorkspaceRepository>,
        mailer: Arc<dyn Mailer>,
        jwt: JwtSettings,
        frontend_origin: &str,
    ) -> Self {
        Self {
            users,
            policy: WorkspacePolicy::new(workspaces.clone()),
            workspaces,
            mailer,
            jwt,
            frontend_origin: frontend_origin.trim_end_matches('/').to_string(),
            invite_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn policy(&self) -> &WorkspacePolicy {
        &self.policy
    }

    /// Default workspace created alongside a new account.
    pub async fn create_default_workspace(
        &self,
        user: &User,
    ) -> Result<(Workspace, Membership), WorkspaceError> {
        let created = self
            .workspaces
            .create_workspace_with_creator(
                &NewWorkspace::default_for(&user.username),
                user.id,
                &user.email,
            )
            .await?;
        info!(workspace_id = %created.0.id, user_id = %user.id, "default workspace created");
        Ok(created)
    }

    pub async fn list_workspaces(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> Result<Vec<WorkspaceMembershipSummary>, WorkspaceError> {
        Ok(self
            .workspaces
            .list_user_workspaces(user_id, page.limit, page.offset)
            .await?)
    }

    pub async fn get_workspace(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
    ) -> Result<WorkspaceDetails, WorkspaceError> {
        let membership = self.policy.ensure_member(workspace_id, actor_id).await?;
        let workspace = self
            .workspaces
            .find_workspace(workspace_id)
            .await?
            .ok_or_else(|| WorkspaceError::NotFound("Workspace not found".into()))?;
        Ok(WorkspaceDetails {
            workspace,
            role: membership.role,
            membership_id: membership.id,
        })
    }

    pub async fn update_workspace(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        mut update: WorkspaceUpdate,
    ) -> Result<Workspace, WorkspaceError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;

        if let Some(name) = update.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(WorkspaceError::Validation(
                    "Workspace name cannot be empty".into(),
                ));
            }
        }
        if let Some(start_day) = update.start_day.as_mut() {
            let day = WEEK_DAYS
                .iter()
                .find(|day| day.eq_ignore_ascii_case(start_day.trim()))
                .ok_or_else(|| {
                    WorkspaceError::Validation("Start day must be a day of the week".into())
                })?;
            *start_day = day.to_string();
        }

        self.workspaces
            .update_workspace(workspace_id, &update)
            .await?
            .ok_or_else(|| WorkspaceError::NotFound("Workspace not found".into()))
    }

    pub async fn list_members(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<MemberResult>, WorkspaceError> {
        self.policy.ensure_member(workspace_id, actor_id).await?;
        let rows = self.workspaces.list_confirmed_members(workspace_id).await?;
        Ok(rows.into_iter().map(MemberResult::from).collect())
    }

    /// Invites every requested email. The batch is validated up front; after
    /// that each email succeeds or fails on its own.
    pub async fn add_members(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        members: Vec<NewMember>,
        origin_hint: Option<&str>,
    ) -> Result<Vec<InviteResult>, WorkspaceError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;

        if members.is_empty() {
            return Err(WorkspaceError::Validation(
                "At least one member is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(members.len());
        for member in members {
            let email = normalize_email(&member.email);
            if !is_valid_email(&email) {
                return Err(WorkspaceError::Validation(format!(
                    "Invalid email address: {}",
                    member.email.trim()
                )));
            }
            if !member.role.is_assignable() {
                return Err(WorkspaceError::Validation(
                    "Role must be ADMIN or MEMBER".into(),
                ));
            }
            if seen.insert(email.clone()) {
                requests.push((email, member.role));
            }
        }

        let workspace = self
            .workspaces
            .find_workspace(workspace_id)
            .await?
            .ok_or_else(|| WorkspaceError::NotFound("Workspace not found".into()))?;
        let origin = self.resolve_origin(origin_hint);

        let mut results = Vec::with_capacity(requests.len());
        for (email, role) in requests {
            let result = match self.invite_one(&workspace, &email, role, &origin).await {
                Ok((outcome, member)) => InviteResult {
                    email,
                    outcome,
                    member: Some(member),
                    error: None,
                },
                Err(err) => {
                    let status = err.status();
                    let message = if status.is_server_error() {
                        error!(?err, %workspace_id, "failed to invite member");
                        "Internal error".to_string()
                    } else {
                        warn!(%workspace_id, error = %err, "member invite rejected");
                        err.to_string()
                    };
                    InviteResult {
                        email,
                        outcome: InviteOutcome::Failed,
                        member: None,
                        error: Some(InviteFailure {
                            code: err.code().map(str::to_string),
                            message,
                            status: status.as_u16(),
                        }),
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn invite_one(
        &self,
        workspace: &Workspace,
        email: &str,
        role: WorkspaceRole,
        origin: &str,
    ) -> Result<(InviteOutcome, MemberResult), WorkspaceError> {
        let key = (workspace.id, email.to_string());
        let lock = self
            .invite_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.invite_locked(workspace, email, role, origin).await
        };

        drop(lock);
        self.invite_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn invite_locked(
        &self,
        workspace: &Workspace,
        email: &str,
        role: WorkspaceRole,
        origin: &str,
    ) -> Result<(InviteOutcome, MemberResult), WorkspaceError> {
        let user = self.users.find_user_by_email(email).await?;

        if let Some(existing) = self.find_slot(workspace.id, email, user.as_ref()).await? {
            return self
                .reinvite(workspace, existing, user.as_ref(), origin)
                .await;
        }

        let inserted = self
            .workspaces
            .insert_membership_if_absent(workspace.id, user.as_ref().map(|u| u.id), email, role)
            .await?;

        let Some(membership) = inserted else {
            // Another request claimed the slot between our lookup and insert.
            let existing = self
                .find_slot(workspace.id, email, user.as_ref())
                .await?
                .ok_or_else(|| {
                    WorkspaceError::Conflict("The invitation is already being processed".into())
                })?;
            return self
                .reinvite(workspace, existing, user.as_ref(), origin)
                .await;
        };

        if let Err(err) = self
            .send_invite(workspace, &membership, user.as_ref(), origin)
            .await
        {
            if let Err(cleanup) = self.workspaces.delete_membership(membership.id).await {
                error!(?cleanup, membership_id = %membership.id, "failed to remove undelivered invite");
            }
            return Err(err);
        }

        Ok((
            InviteOutcome::Invited,
            MemberResult::new(&membership, user.map(|u| u.username)),
        ))
    }

    async fn find_slot(
        &self,
        workspace_id: Uuid,
        email: &str,
        user: Option<&User>,
    ) -> Result<Option<Membership>, sqlx::Error> {
        if let Some(found) = self
            .workspaces
            .find_membership_by_email(workspace_id, email)
            .await?
        {
            return Ok(Some(found));
        }
        match user {
            Some(user) => {
                self.workspaces
                    .find_membership_for_user(workspace_id, user.id)
                    .await
            }
            None => Ok(None),
        }
    }

    async fn reinvite(
        &self,
        workspace: &Workspace,
        membership: Membership,
        user: Option<&User>,
        origin: &str,
    ) -> Result<(InviteOutcome, MemberResult), WorkspaceError> {
        if membership.is_confirmed {
            return Err(WorkspaceError::Conflict(
                "User is already a member of this workspace".into(),
            ));
        }

        let username = user.map(|u| u.username.clone());
        if !membership.invite_expired(OffsetDateTime::now_utc()) {
            return Ok((
                InviteOutcome::Pending,
                MemberResult::new(&membership, username),
            ));
        }

        self.send_invite(workspace, &membership, user, origin)
            .await?;
        let refreshed = self
            .workspaces
            .touch_membership(membership.id)
            .await?
            .unwrap_or(membership);
        Ok((InviteOutcome::Resent, MemberResult::new(&refreshed, username)))
    }

    async fn send_invite(
        &self,
        workspace: &Workspace,
        membership: &Membership,
        user: Option<&User>,
        origin: &str,
    ) -> Result<(), WorkspaceError> {
        let exp = (OffsetDateTime::now_utc() + INVITE_TTL).unix_timestamp() as usize;
        let claims = InviteClaims::new(
            membership.id,
            user.map(|u| u.id),
            workspace.id,
            &membership.email,
            exp,
        );
        let token = self.jwt.sign(claims)?;
        let path = if user.is_some() {
            "accept-invite"
        } else {
            "sign-up"
        };
        let url = format!("{}/{}?token={}", origin, path, urlencoding::encode(&token));

        let template = match user {
            Some(_) => MailTemplate::WorkspaceInvite {
                token,
                url,
                workspace_name: workspace.name.clone(),
            },
            None => MailTemplate::SignupInvite {
                token,
                url,
                workspace_name: workspace.name.clone(),
            },
        };

        self.mailer
            .send_template(&membership.email, &template)
            .await
            .map_err(|err| {
                warn!(membership_id = %membership.id, error = %err, "invite email failed");
                WorkspaceError::MailDelivery(err)
            })?;
        info!(
            membership_id = %membership.id,
            workspace_id = %workspace.id,
            template = template.name(),
            "workspace invite issued"
        );
        Ok(())
    }

    /// Invite links always point at the configured frontend. A hint is only
    /// honoured when it resolves to that same origin.
    fn resolve_origin(&self, hint: Option<&str>) -> String {
        if let Some(origin) = hint.and_then(origin_of) {
            if origin.eq_ignore_ascii_case(&self.frontend_origin) {
                return origin;
            }
            warn!(%origin, "ignoring invite origin outside the configured frontend");
        }
        self.frontend_origin.clone()
    }

    /// Confirms the membership an invite token points at. The stored row is
    /// authoritative; the token is only a pointer to it.
    pub async fn accept_invite(&self, token: &str) -> Result<AcceptedInvite, WorkspaceError> {
        self.accept(token, None).await
    }

    /// Accepts on behalf of a known account; the invite must be addressed to `email`.
    pub async fn accept_invite_for(
        &self,
        token: &str,
        email: &str,
    ) -> Result<AcceptedInvite, WorkspaceError> {
        self.accept(token, Some(email)).await
    }

    async fn accept(
        &self,
        token: &str,
        expected_email: Option<&str>,
    ) -> Result<AcceptedInvite, WorkspaceError> {
        let claims: InviteClaims = self.jwt.verify(token, TokenUse::Invite).map_err(|err| {
            warn!(error = %err, "rejected invite token");
            WorkspaceError::InvalidInvite
        })?;
        let email = normalize_email(&claims.email);
        if let Some(expected) = expected_email {
            if normalize_email(expected) != email {
                warn!(membership_id = %claims.membership_id, "invite presented for another email");
                return Err(WorkspaceError::Forbidden(
                    "This invite was sent to a different email address".into(),
                ));
            }
        }

        let user = self
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| WorkspaceError::Validation("You are not registered yet".into()))?;

        let membership = self
            .workspaces
            .find_membership(claims.membership_id)
            .await?
            .filter(|m| m.workspace_id == claims.workspace_id && m.email == email)
            .ok_or(WorkspaceError::InvalidInvite)?;

        if membership.is_confirmed {
            return Err(WorkspaceError::Conflict("Invite already accepted".into()));
        }
        if membership.invite_expired(OffsetDateTime::now_utc()) {
            return Err(WorkspaceError::InvalidInvite);
        }

        let confirmed = match self
            .workspaces
            .confirm_membership(membership.id, user.id)
            .await
        {
            Ok(Some(confirmed)) => confirmed,
            Ok(None) => return Err(WorkspaceError::Conflict("Invite already accepted".into())),
            Err(err) if is_unique_violation(&err) => {
                return Err(WorkspaceError::Conflict(
                    "You are already a member of this workspace".into(),
                ))
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            membership_id = %confirmed.id,
            workspace_id = %confirmed.workspace_id,
            user_id = %user.id,
            "workspace invite accepted"
        );
        Ok(AcceptedInvite {
            workspace_id: confirmed.workspace_id,
            member: MemberResult::new(&confirmed, Some(user.username)),
        })
    }

    /// Loads a confirmed, non-self, non-creator membership of this workspace.
    async fn load_target(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        membership_id: Uuid,
        self_message: &str,
        creator_message: &str,
    ) -> Result<Membership, WorkspaceError> {
        let target = self
            .workspaces
            .find_membership(membership_id)
            .await?
            .filter(|m| m.workspace_id == workspace_id && m.is_confirmed)
            .ok_or_else(|| WorkspaceError::NotFound("Member not found".into()))?;

        if target.user_id == Some(actor_id) {
            return Err(WorkspaceError::Forbidden(self_message.to_string()));
        }
        if target.role == WorkspaceRole::Creator {
            return Err(WorkspaceError::Forbidden(creator_message.to_string()));
        }
        Ok(target)
    }

    async fn username_of(&self, membership: &Membership) -> Result<Option<String>, sqlx::Error> {
        match membership.user_id {
            Some(user_id) => Ok(self
                .users
                .find_user_by_id(user_id)
                .await?
                .map(|u| u.username)),
            None => Ok(None),
        }
    }

    pub async fn update_member(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        membership_id: Uuid,
        role: WorkspaceRole,
        is_confirmed: Option<bool>,
    ) -> Result<MemberResult, WorkspaceError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;
        if !role.is_assignable() {
            return Err(WorkspaceError::Validation(
                "Role must be ADMIN or MEMBER".into(),
            ));
        }

        let target = self
            .load_target(
                workspace_id,
                actor_id,
                membership_id,
                "You cannot update yourself",
                "The workspace creator cannot be modified",
            )
            .await?;

        let updated = self
            .workspaces
            .update_membership(
                target.id,
                role,
                is_confirmed.unwrap_or(target.is_confirmed),
            )
            .await?
            .ok_or_else(|| WorkspaceError::NotFound("Member not found".into()))?;

        info!(%workspace_id, membership_id = %updated.id, role = ?updated.role, "member updated");
        let username = self.username_of(&updated).await?;
        Ok(MemberResult::new(&updated, username))
    }

    pub async fn remove_member(
        &self,
        workspace_id: Uuid,
        actor_id: Uuid,
        membership_id: Uuid,
    ) -> Result<MemberResult, WorkspaceError> {
        self.policy.ensure_admin(workspace_id, actor_id).await?;

        let target = self
            .load_target(
                workspace_id,
                actor_id,
                membership_id,
                "You cannot remove yourself",
                "The workspace creator cannot be removed",
            )
            .await?;

        if !self.workspaces.delete_membership(target.id).await? {
            return Err(WorkspaceError::NotFound("Member not found".into()));
        }

        info!(%workspace_id, membership_id = %target.id, "member removed");
        let username = self.username_of(&target).await?;
        Ok(MemberResult::new(&target, username))
    }
}

/// `scheme://host[:port]` of an Origin or Referer header value.
fn origin_of(value: &str) -> Option<String> {
    let value = value.trim();
    let (scheme, rest) = value.split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, authority))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::atomic::Ordering;
    use time::Duration;

    fn member(email: &str, role: WorkspaceRole) -> NewMember {
        NewMember {
            email: email.to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn workspace_has_exactly_one_confirmed_creator() {
        let fx = fixture().await;
        let rows = fx.db.memberships_in(fx.workspace.id);
        let creators: Vec<_> = rows
            .iter()
            .filter(|m| m.role == WorkspaceRole::Creator)
            .collect();
        assert_eq!(creators.len(), 1);
        assert!(creators[0].is_confirmed);
        assert_eq!(fx.workspace.name, "owner's Workspace");
        assert_eq!(fx.workspace.start_day, "Sunday");
    }

    #[tokio::test]
    async fn invite_for_unregistered_email_creates_unbound_pending_row() {
        let fx = fixture().await;
        let results = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member(" New@X.com ", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, InviteOutcome::Invited);
        let result = results[0].member.clone().unwrap();
        assert_eq!(result.email, "new@x.com");
        assert_eq!(result.member_id, None);
        assert!(!result.is_confirmed);

        let sent = fx.mailer.sent.lock().unwrap();
        let (to, template) = &sent[0];
        assert_eq!(to, "new@x.com");
        match template {
            MailTemplate::SignupInvite { url, .. } => {
                assert!(url.starts_with("http://localhost:5173/sign-up?token="))
            }
            other => panic!("unexpected template {other:?}"),
        }
    }

    #[tokio::test]
    async fn invite_for_existing_account_binds_user() {
        let fx = fixture().await;
        let existing = fx.db.add_user("friend@x.com", "friend");
        let results = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("friend@x.com", WorkspaceRole::Admin)],
                Some("http://localhost:5173/settings/team"),
            )
            .await
            .unwrap();

        let result = results[0].member.clone().unwrap();
        assert_eq!(result.member_id, Some(existing.id));
        assert_eq!(result.username.as_deref(), Some("friend"));
        assert_eq!(result.role, WorkspaceRole::Admin);
        let sent = fx.mailer.sent.lock().unwrap();
        assert!(matches!(
            &sent[0].1,
            MailTemplate::WorkspaceInvite { url, .. }
                if url.starts_with("http://localhost:5173/accept-invite?token=")
        ));
    }

    #[tokio::test]
    async fn foreign_origin_hint_is_ignored() {
        let fx = fixture().await;
        fx.service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                Some("https://evil.example.com"),
            )
            .await
            .unwrap();
        let sent = fx.mailer.sent.lock().unwrap();
        assert!(matches!(
            &sent[0].1,
            MailTemplate::SignupInvite { url, .. } if url.starts_with("http://localhost:5173/")
        ));
    }

    #[tokio::test]
    async fn repeat_invite_within_ttl_is_suppressed() {
        let fx = fixture().await;
        for _ in 0..2 {
            fx.service
                .add_members(
                    fx.workspace.id,
                    fx.owner.id,
                    vec![member("new@x.com", WorkspaceRole::Member)],
                    None,
                )
                .await
                .unwrap();
        }
        let results = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("NEW@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(results[0].outcome, InviteOutcome::Pending);
        assert_eq!(fx.mailer.sent_count(), 1);
        let pending: Vec<_> = fx
            .db
            .memberships_in(fx.workspace.id)
            .into_iter()
            .filter(|m| m.email == "new@x.com")
            .collect();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn expired_invite_is_resent_and_restarts_the_window() {
        let fx = fixture().await;
        let first = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();
        let membership_id = first[0].member.as_ref().unwrap().membership_id;
        fx.db.age_membership(membership_id, Duration::days(8));

        let second = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(second[0].outcome, InviteOutcome::Resent);
        assert_eq!(fx.mailer.sent_count(), 2);
        let row = fx.db.membership(membership_id).unwrap();
        assert!(!row.invite_expired(OffsetDateTime::now_utc()));
    }

    #[tokio::test]
    async fn failed_resend_keeps_the_old_timestamp() {
        let fx = fixture().await;
        let first = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();
        let membership_id = first[0].member.as_ref().unwrap().membership_id;
        fx.db.age_membership(membership_id, Duration::days(8));
        let before = fx.db.membership(membership_id).unwrap().updated_at;

        fx.mailer.set_failing(true);
        let results = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(results[0].outcome, InviteOutcome::Failed);
        assert_eq!(results[0].error.as_ref().unwrap().status, 417);
        assert_eq!(fx.db.membership(membership_id).unwrap().updated_at, before);
    }

    #[tokio::test]
    async fn undelivered_fresh_invite_leaves_no_row() {
        let fx = fixture().await;
        fx.mailer.set_failing(true);
        let results = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();

        let failure = results[0].error.clone().unwrap();
        assert_eq!(failure.code.as_deref(), Some("mail_delivery_failed"));
        assert!(fx
            .db
            .memberships_in(fx.workspace.id)
            .iter()
            .all(|m| m.email != "new@x.com"));
    }

    #[tokio::test]
    async fn confirmed_member_cannot_be_invited_again() {
        let fx = fixture().await;
        fx.add_confirmed("mate@x.com", WorkspaceRole::Member).await;
        let results = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![
                    member("mate@x.com", WorkspaceRole::Member),
                    member("other@x.com", WorkspaceRole::Member),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(results[0].outcome, InviteOutcome::Failed);
        assert_eq!(results[0].error.as_ref().unwrap().status, 409);
        assert_eq!(results[1].outcome, InviteOutcome::Invited);
    }

    #[tokio::test]
    async fn losing_the_insert_race_falls_back_to_the_existing_row() {
        let fx = fixture().await;
        fx.db.lose_next_invite_race.store(true, Ordering::SeqCst);
        let results = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("racy@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(results[0].outcome, InviteOutcome::Pending);
        assert_eq!(fx.mailer.sent_count(), 0);
        assert_eq!(
            fx.db
                .memberships_in(fx.workspace.id)
                .iter()
                .filter(|m| m.email == "racy@x.com")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn batch_validation_fails_fast() {
        let fx = fixture().await;
        let err = fx
            .service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![
                    member("ok@x.com", WorkspaceRole::Member),
                    member("boss@x.com", WorkspaceRole::Creator),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Validation(_)));
        assert_eq!(fx.mailer.sent_count(), 0);

        let err = fx
            .service
            .add_members(fx.workspace.id, fx.owner.id, vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Validation(_)));
    }

    #[tokio::test]
    async fn plain_members_cannot_invite() {
        let fx = fixture().await;
        let (mate, _) = fx.add_confirmed("mate@x.com", WorkspaceRole::Member).await;
        let err = fx
            .service
            .add_members(
                fx.workspace.id,
                mate.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signup_then_accept_confirms_and_replay_fails() {
        let fx = fixture().await;
        fx.service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();
        let token = fx.mailer.last_token().unwrap();

        let err = fx.service.accept_invite(&token).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Validation(ref m) if m == "You are not registered yet"));

        let newcomer = fx.db.add_user("new@x.com", "new");
        let accepted = fx.service.accept_invite(&token).await.unwrap();
        assert_eq!(accepted.workspace_id, fx.workspace.id);
        assert_eq!(accepted.member.member_id, Some(newcomer.id));
        assert!(accepted.member.is_confirmed);

        let members = fx
            .service
            .list_members(fx.workspace.id, fx.owner.id)
            .await
            .unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, WorkspaceRole::Creator);

        let replay = fx.service.accept_invite(&token).await.unwrap_err();
        assert!(matches!(replay, WorkspaceError::Conflict(_)));
    }

    #[tokio::test]
    async fn expired_or_forged_invites_are_rejected() {
        let fx = fixture().await;
        fx.service
            .add_members(
                fx.workspace.id,
                fx.owner.id,
                vec![member("new@x.com", WorkspaceRole::Member)],
                None,
            )
            .await
            .unwrap();
        let token = fx.mailer.last_token().unwrap();
        fx.db.add_user("new@x.com", "new");

        assert!(matches!(
            fx.service.accept_invite("not-a-token").await,
            Err(WorkspaceError::InvalidInvite)
        ));

        let pending = fx
            .db
            .memberships_in(fx.workspace.id)
            .into_iter()
            .find(|m| m.email == "new@x.com")
            .unwrap();
        fx.db.age_membership(pending.id, Duration::days(8));
        assert!(matches!(
            fx.service.accept_invite(&token).await,
            Err(WorkspaceError::InvalidInvite)
        ));
    }

    #[tokio::test]
    async fn creator_and_self_are_protected() {
        let fx = fixture().await;
        let (admin, admin_row) = fx.add_confirmed("admin@x.com", WorkspaceRole::Admin).await;
        let creator_row = fx
            .db
            .memberships_in(fx.workspace.id)
            .into_iter()
            .find(|m| m.role == WorkspaceRole::Creator)
            .unwrap();

        let err = fx
            .service
            .remove_member(fx.workspace.id, admin.id, creator_row.id)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = fx
            .service
            .update_member(
                fx.workspace.id,
                admin.id,
                creator_row.id,
                WorkspaceRole::Member,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = fx
            .service
            .remove_member(fx.workspace.id, admin.id, admin_row.id)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Forbidden(ref m) if m == "You cannot remove yourself"));

        let err = fx
            .service
            .remove_member(fx.workspace.id, fx.owner.id, creator_row.id)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            fx.db
                .memberships_in(fx.workspace.id)
                .iter()
                .filter(|m| m.role == WorkspaceRole::Creator)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn update_member_keeps_invite_timestamp() {
        let fx = fixture().await;
        let (_, row) = fx.add_confirmed("mate@x.com", WorkspaceRole::Member).await;
        let before = fx.db.membership(row.id).unwrap().updated_at;

        let updated = fx
            .service
            .update_member(fx.workspace.id, fx.owner.id, row.id, WorkspaceRole::Admin, None)
            .await
            .unwrap();

        assert_eq!(updated.role, WorkspaceRole::Admin);
        assert_eq!(updated.username.as_deref(), Some("mate"));
        assert_eq!(fx.db.membership(row.id).unwrap().updated_at, before);

        let err = fx
            .service
            .update_member(fx.workspace.id, fx.owner.id, row.id, WorkspaceRole::Creator, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Validation(_)));
    }

    #[tokio::test]
    async fn members_of_other_workspaces_are_not_found() {
        let fx = fixture().await;
        let stranger = fx.db.add_user("stranger@x.com", "stranger");
        let (elsewhere, _) = fx.service.create_default_workspace(&stranger).await.unwrap();
        let foreign_row = fx
            .db
            .memberships_in(elsewhere.id)
            .into_iter()
            .next()
            .unwrap();

        let err = fx
            .service
            .remove_member(fx.workspace.id, fx.owner.id, foreign_row.id)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn removing_a_member_drops_the_row() {
        let fx = fixture().await;
        let (_, row) = fx.add_confirmed("mate@x.com", WorkspaceRole::Member).await;
        let removed = fx
            .service
            .remove_member(fx.workspace.id, fx.owner.id, row.id)
            .await
            .unwrap();
        assert_eq!(removed.membership_id, row.id);
        assert!(fx.db.membership(row.id).is_none());
    }

    #[tokio::test]
    async fn workspace_listing_puts_creator_workspace_first() {
        let fx = fixture().await;
        let other_owner = fx.db.add_user("boss@x.com", "boss");
        let (other, _) = fx
            .service
            .create_default_workspace(&other_owner)
            .await
            .unwrap();
        let row = fx
            .db
            .insert_membership_if_absent(other.id, Some(fx.owner.id), &fx.owner.email, WorkspaceRole::Member)
            .await
            .unwrap()
            .unwrap();
        fx.db.confirm_membership(row.id, fx.owner.id).await.unwrap();

        let listed = fx
            .service
            .list_workspaces(fx.owner.id, Page::new(None, None))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, fx.workspace.id);
        assert_eq!(listed[1].role, WorkspaceRole::Member);

        let second_page = fx
            .service
            .list_workspaces(fx.owner.id, Page::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, other.id);
    }

    #[tokio::test]
    async fn workspace_settings_are_validated() {
        let fx = fixture().await;
        let updated = fx
            .service
            .update_workspace(
                fx.workspace.id,
                fx.owner.id,
                WorkspaceUpdate {
                    name: Some("  Launch Team ".into()),
                    start_day: Some("monday".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Launch Team");
        assert_eq!(updated.start_day, "Monday");

        let err = fx
            .service
            .update_workspace(
                fx.workspace.id,
                fx.owner.id,
                WorkspaceUpdate {
                    name: Some("   ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Validation(_)));
    }

    #[tokio::test]
    async fn non_members_cannot_see_a_workspace() {
        let fx = fixture().await;
        let stranger = fx.db.add_user("stranger@x.com", "stranger");
        let err = fx
            .service
            .get_workspace(fx.workspace.id, stranger.id)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err = fx
            .service
            .get_workspace(Uuid::new_v4(), stranger.id)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let details = fx
            .service
            .get_workspace(fx.workspace.id, fx.owner.id)
            .await
            .unwrap();
        assert_eq!(details.role, WorkspaceRole::Creator);
    }

    #[test]
    fn origin_is_extracted_from_referer() {
        assert_eq!(
            origin_of("https://app.example.com/team?tab=1").as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(origin_of("garbage"), None);
    }
}
