use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::workspace::{
    MemberRow, Membership, NewWorkspace, Workspace, WorkspaceMembershipSummary, WorkspaceRole,
    WorkspaceUpdate,
};

use super::workspace_repository::WorkspaceRepository;

const WORKSPACE_COLUMNS: &str =
    "id, name, time_zone, time_zone_offset, start_day, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str =
    "id, workspace_id, user_id, email, role, is_confirmed, created_at, updated_at";

pub struct PostgresWorkspaceRepository {
    pub pool: PgPool,
}

#[async_trait]
impl WorkspaceRepository for PostgresWorkspaceRepository {
    async fn create_workspace_with_creator(
        &self,
        workspace: &NewWorkspace,
        creator_id: Uuid,
        creator_email: &str,
    ) -> Result<(Workspace, Membership), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO workspaces (name, time_zone, time_zone_offset, start_day, created_at, updated_at)
             VALUES ($1, $2, $3, $4, now(), now())
             RETURNING {WORKSPACE_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Workspace>(&sql)
            .bind(&workspace.name)
            .bind(&workspace.time_zone)
            .bind(&workspace.time_zone_offset)
            .bind(&workspace.start_day)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO user_workspaces (workspace_id, user_id, email, role, is_confirmed, created_at, updated_at)
             VALUES ($1, $2, $3, 'CREATOR', true, now(), now())
             RETURNING {MEMBERSHIP_COLUMNS}"
        );
        let membership = sqlx::query_as::<_, Membership>(&sql)
            .bind(created.id)
            .bind(creator_id)
            .bind(creator_email)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((created, membership))
    }

    async fn find_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, sqlx::Error> {
        let sql = format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = $1");
        sqlx::query_as::<_, Workspace>(&sql)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_workspace(
        &self,
        workspace_id: Uuid,
        update: &WorkspaceUpdate,
    ) -> Result<Option<Workspace>, sqlx::Error> {
        let sql = format!(
            "UPDATE workspaces
             SET name = COALESCE($2, name),
                 time_zone = COALESCE($3, time_zone),
                 time_zone_offset = COALESCE($4, time_zone_offset),
                 start_day = COALESCE($5, start_day),
                 updated_at = now()
             WHERE id = $1
             RETURNING {WORKSPACE_COLUMNS}"
        );
        sqlx::query_as::<_, Workspace>(&sql)
            .bind(workspace_id)
            .bind(update.name.as_deref())
            .bind(update.time_zone.as_deref())
            .bind(update.time_zone_offset.as_deref())
            .bind(update.start_day.as_deref())
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let sql = format!("SELECT {MEMBERSHIP_COLUMNS} FROM user_workspaces WHERE id = $1");
        sqlx::query_as::<_, Membership>(&sql)
            .bind(membership_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_membership_by_email(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_workspaces
             WHERE workspace_id = $1 AND email = $2"
        );
        sqlx::query_as::<_, Membership>(&sql)
            .bind(workspace_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_membership_for_user(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM user_workspaces
             WHERE workspace_id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, Membership>(&sql)
            .bind(workspace_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn insert_membership_if_absent(
        &self,
        workspace_id: Uuid,
        user_id: Option<Uuid>,
        email: &str,
        role: WorkspaceRole,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let sql = format!(
            "INSERT INTO user_workspaces (workspace_id, user_id, email, role, is_confirmed, created_at, updated_at)
             VALUES ($1, $2, $3, $4, false, now(), now())
             ON CONFLICT DO NOTHING
             RETURNING {MEMBERSHIP_COLUMNS}"
        );
        sqlx::query_as::<_, Membership>(&sql)
            .bind(workspace_id)
            .bind(user_id)
            .bind(email)
            .bind(role)
            .fetch_optional(&self.pool)
            .await
    }

    async fn touch_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let sql = format!(
            "UPDATE user_workspaces SET updated_at = now()
             WHERE id = $1 AND is_confirmed = false
             RETURNING {MEMBERSHIP_COLUMNS}"
        );
        sqlx::query_as::<_, Membership>(&sql)
            .bind(membership_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn confirm_membership(
        &self,
        membership_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let sql = format!(
            "UPDATE user_workspaces
             SET is_confirmed = true, user_id = $2, updated_at = now()
             WHERE id = $1 AND is_confirmed = false
             RETURNING {MEMBERSHIP_COLUMNS}"
        );
        sqlx::query_as::<_, Membership>(&sql)
            .bind(membership_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_membership(
        &self,
        membership_id: Uuid,
        role: WorkspaceRole,
        is_confirmed: bool,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let sql = format!(
            "UPDATE user_workspaces
             SET role = $2, is_confirmed = $3
             WHERE id = $1 AND role <> 'CREATOR'
             RETURNING {MEMBERSHIP_COLUMNS}"
        );
        sqlx::query_as::<_, Membership>(&sql)
            .bind(membership_id)
            .bind(role)
            .bind(is_confirmed)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_membership(&self, membership_id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM user_workspaces WHERE id = $1 AND role <> 'CREATOR'")
                .bind(membership_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_confirmed_members(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<MemberRow>, sqlx::Error> {
        sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT m.id AS membership_id,
                   m.workspace_id,
                   m.user_id,
                   u.username,
                   m.email,
                   m.role,
                   m.is_confirmed
            FROM user_workspaces m
            LEFT JOIN users u ON u.id = m.user_id
            WHERE m.workspace_id = $1 AND m.is_confirmed = true
            ORDER BY (m.role = 'CREATOR') DESC, m.updated_at ASC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_user_workspaces(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkspaceMembershipSummary>, sqlx::Error> {
        sqlx::query_as::<_, WorkspaceMembershipSummary>(
            r#"
            SELECT w.id,
                   w.name,
                   w.time_zone,
                   w.time_zone_offset,
                   w.start_day,
                   m.role,
                   m.id AS membership_id,
                   w.created_at,
                   m.updated_at AS membership_updated_at
            FROM user_workspaces m
            JOIN workspaces w ON w.id = m.workspace_id
            WHERE m.user_id = $1 AND m.is_confirmed = true
            ORDER BY (m.role = 'CREATOR') DESC, m.updated_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}
