use async_trait::async_trait;
use uuid::Uuid;

use crate::models::workspace::{
    MemberRow, Membership, NewWorkspace, Workspace, WorkspaceMembershipSummary, WorkspaceRole,
    WorkspaceUpdate,
};

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    /// Creates the workspace and its confirmed CREATOR membership atomically.
    async fn create_workspace_with_creator(
        &self,
        workspace: &NewWorkspace,
        creator_id: Uuid,
        creator_email: &str,
    ) -> Result<(Workspace, Membership), sqlx::Error>;

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, sqlx::Error>;

    async fn update_workspace(
        &self,
        workspace_id: Uuid,
        update: &WorkspaceUpdate,
    ) -> Result<Option<Workspace>, sqlx::Error>;

    async fn find_membership(&self, membership_id: Uuid)
        -> Result<Option<Membership>, sqlx::Error>;

    async fn find_membership_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Membership>, sqlx::Error>;

    async fn find_membership_for_user(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error>;

    /// Returns `None` when another writer already holds the (workspace, email) slot.
    async fn insert_membership_if_absent(
        &self,
        workspace_id: Uuid,
        user_id: Option<Uuid>,
        email: &str,
        role: WorkspaceRole,
    ) -> Result<Option<Membership>, sqlx::Error>;

    /// Bumps `updated_at`, which restarts the invite expiry window.
    async fn touch_membership(&self, membership_id: Uuid)
        -> Result<Option<Membership>, sqlx::Error>;

    /// Binds the user and confirms, only if the row is still pending.
    async fn confirm_membership(
        &self,
        membership_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error>;

    /// Role/confirmation change that leaves `updated_at` alone.
    async fn update_membership(
        &self,
        membership_id: Uuid,
        role: WorkspaceRole,
        is_confirmed: bool,
    ) -> Result<Option<Membership>, sqlx::Error>;

    async fn delete_membership(&self, membership_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn list_confirmed_members(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<MemberRow>, sqlx::Error>;

    /// Confirmed workspaces of a user, CREATOR first, then by acceptance order.
    async fn list_user_workspaces(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkspaceMembershipSummary>, sqlx::Error>;
}
