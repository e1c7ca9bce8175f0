use axum::{
    extract::{Path, Query, State},
    http::{
        header::{ORIGIN, REFERER},
        HeaderMap, StatusCode,
    },
    response::Response,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    models::workspace::{WorkspaceRole, WorkspaceUpdate},
    responses::{error_response, JsonResponse},
    routes::{auth::session::AuthSession, PageQuery},
    services::workspace_service::{InviteResult, NewMember},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AddMembersPayload {
    pub members: Vec<NewMember>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberPayload {
    pub role: WorkspaceRole,
    #[serde(default)]
    pub is_confirmed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitePayload {
    pub token: String,
}

pub async fn list_workspaces(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<PageQuery>,
) -> Response {
    match state
        .workspaces
        .list_workspaces(session.user_id, query.page())
        .await
    {
        Ok(workspaces) => JsonResponse::success_with_data("Workspaces", workspaces),
        Err(err) => error_response(&err),
    }
}

pub async fn get_workspace(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
) -> Response {
    match state
        .workspaces
        .get_workspace(workspace_id, session.user_id)
        .await
    {
        Ok(details) => JsonResponse::success_with_data("Workspace", details),
        Err(err) => error_response(&err),
    }
}

pub async fn update_workspace(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    Json(update): Json<WorkspaceUpdate>,
) -> Response {
    match state
        .workspaces
        .update_workspace(workspace_id, session.user_id, update)
        .await
    {
        Ok(workspace) => JsonResponse::success_with_data("Workspace updated", workspace),
        Err(err) => error_response(&err),
    }
}

pub async fn list_members(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
) -> Response {
    match state
        .workspaces
        .list_members(workspace_id, session.user_id)
        .await
    {
        Ok(members) => JsonResponse::success_with_data("Members", members),
        Err(err) => error_response(&err),
    }
}

pub async fn add_members(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AddMembersPayload>,
) -> Response {
    let origin_hint = headers
        .get(ORIGIN)
        .or_else(|| headers.get(REFERER))
        .and_then(|value| value.to_str().ok());
    let single = payload.members.len() == 1;

    let results = match state
        .workspaces
        .add_members(workspace_id, session.user_id, payload.members, origin_hint)
        .await
    {
        Ok(results) => results,
        Err(err) => return error_response(&err),
    };

    // A lone invite reports its own failure status instead of a batch.
    if single {
        if let Some(InviteResult {
            error: Some(failure),
            ..
        }) = results.first()
        {
            let status =
                StatusCode::from_u16(failure.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return JsonResponse::error(status, &failure.message, failure.code.as_deref());
        }
    }

    JsonResponse::success_with_data("Invitations processed", results)
}

pub async fn update_member(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, membership_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMemberPayload>,
) -> Response {
    match state
        .workspaces
        .update_member(
            workspace_id,
            session.user_id,
            membership_id,
            payload.role,
            payload.is_confirmed,
        )
        .await
    {
        Ok(member) => JsonResponse::success_with_data("Member updated", member),
        Err(err) => error_response(&err),
    }
}

pub async fn remove_member(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, membership_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state
        .workspaces
        .remove_member(workspace_id, session.user_id, membership_id)
        .await
    {
        Ok(member) => JsonResponse::success_with_data("Member removed", member),
        Err(err) => error_response(&err),
    }
}

pub async fn accept_invite(
    State(state): State<AppState>,
    Json(payload): Json<AcceptInvitePayload>,
) -> Response {
    match state.workspaces.accept_invite(payload.token.trim()).await {
        Ok(accepted) => JsonResponse::success_with_data("Invite accepted", accepted),
        Err(err) => error_response(&err),
    }
}
