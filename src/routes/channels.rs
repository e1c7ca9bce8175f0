use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    responses::{error_response, JsonResponse},
    routes::auth::session::AuthSession,
    services::channel_service::CreateChannel,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub auth_token: String,
}

pub async fn list_platforms(State(state): State<AppState>) -> Response {
    JsonResponse::success_with_data("Supported platforms", state.channels.supported_platforms())
}

pub async fn list_channels(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
) -> Response {
    match state
        .channels
        .list_channels(workspace_id, session.user_id)
        .await
    {
        Ok(channels) => JsonResponse::success_with_data("Channels", channels),
        Err(err) => error_response(&err),
    }
}

pub async fn create_channel(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<CreateChannel>,
) -> Response {
    match state
        .channels
        .create_channel(workspace_id, session.user_id, payload)
        .await
    {
        Ok(channel) => JsonResponse::created("Channel created", channel),
        Err(err) => error_response(&err),
    }
}

pub async fn delete_channel(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state
        .channels
        .delete_channel(workspace_id, session.user_id, channel_id)
        .await
    {
        Ok(()) => JsonResponse::success("Channel deleted").into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn disconnect_channel(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state
        .channels
        .disconnect(workspace_id, session.user_id, channel_id)
        .await
    {
        Ok(channel) => JsonResponse::success_with_data("Channel disconnected", channel),
        Err(err) => error_response(&err),
    }
}

pub async fn refresh_channel(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, channel_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RefreshPayload>,
) -> Response {
    match state
        .channels
        .refresh(workspace_id, session.user_id, channel_id, &payload.auth_token)
        .await
    {
        Ok(channel) => JsonResponse::success_with_data("Channel token refreshed", channel),
        Err(err) => error_response(&err),
    }
}

pub async fn channel_status(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state
        .channels
        .check_token_status(workspace_id, session.user_id, channel_id)
        .await
    {
        Ok(report) => JsonResponse::success_with_data("Token status", report),
        Err(err) => error_response(&err),
    }
}
