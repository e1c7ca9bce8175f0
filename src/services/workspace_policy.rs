use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::db::workspace_repository::WorkspaceRepository;
use crate::models::workspace::Membership;
use crate::responses::ApiError;

#[derive(Debug, Error)]
pub enum AccessError {
    /// Also returned for workspaces that do not exist.
    #[error("You do not have access to this workspace")]
    NotMember,
    #[error("Only workspace admins can perform this action")]
    NotAdmin,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError for AccessError {
    fn status(&self) -> StatusCode {
        match self {
            AccessError::NotMember | AccessError::NotAdmin => StatusCode::FORBIDDEN,
            AccessError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Membership gate evaluated on every guarded call. Nothing is cached since
/// roles can change between requests.
#[derive(Clone)]
pub struct WorkspacePolicy {
    workspaces: Arc<dyn WorkspaceRepository>,
}

impl WorkspacePolicy {
    pub fn new(workspaces: Arc<dyn WorkspaceRepository>) -> Self {
        Self { workspaces }
    }

    /// Boolean form of [`Self::ensure_admin`] for callers that branch on the
    /// role instead of rejecting. Only storage failures surface as errors.
    pub async fn is_admin(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AccessError> {
        match self.ensure_admin(workspace_id, user_id).await {
            Ok(_) => Ok(true),
            Err(AccessError::NotMember | AccessError::NotAdmin) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The caller's confirmed membership, or `NotMember`.
    pub async fn ensure_member(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, AccessError> {
        self.workspaces
            .find_membership_for_user(workspace_id, user_id)
            .await?
            .filter(|membership| membership.is_confirmed)
            .ok_or(AccessError::NotMember)
    }

    pub async fn ensure_admin(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, AccessError> {
        let membership = self.ensure_member(workspace_id, user_id).await?;
        if membership.role.is_admin() {
            Ok(membership)
        } else {
            Err(AccessError::NotAdmin)
        }
    }
}
