use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::models::user::PublicUser;
use crate::models::workspace::normalize_email;
use crate::responses::JsonResponse;
use crate::routes::auth::session::{
    session_response, AuthSession, REMEMBERED_SESSION_LIFETIME, SESSION_LIFETIME,
};
use crate::state::AppState;
use crate::utils::password::verify_password;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Deserialize, Serialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

pub async fn handle_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Response {
    let email = normalize_email(&payload.email);
    let user = match state.users.find_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => return JsonResponse::unauthorized(INVALID_CREDENTIALS).into_response(),
        Err(err) => {
            error!(?err, "failed to load user for login");
            return JsonResponse::server_error("Database error").into_response();
        }
    };

    if user.password_hash.trim().is_empty() {
        return JsonResponse::unauthorized(INVALID_CREDENTIALS).into_response();
    }

    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => {
            let lifetime = if payload.remember {
                REMEMBERED_SESSION_LIFETIME
            } else {
                SESSION_LIFETIME
            };
            info!(user_id = %user.id, "user logged in");
            session_response(&state, &user, lifetime, StatusCode::OK, "Logged in", None)
        }
        Ok(false) => JsonResponse::unauthorized(INVALID_CREDENTIALS).into_response(),
        Err(err) => {
            error!(?err, user_id = %user.id, "password verification error");
            JsonResponse::server_error("Internal error").into_response()
        }
    }
}

pub async fn handle_me(State(state): State<AppState>, session: AuthSession) -> Response {
    match state.users.find_user_by_id(session.user_id).await {
        Ok(Some(user)) => JsonResponse::success_with_data(
            "Current user",
            PublicUser::from_user(&user, OffsetDateTime::now_utc()),
        ),
        Ok(None) => JsonResponse::unauthorized("User not found").into_response(),
        Err(err) => {
            error!(?err, user_id = %session.user_id, "failed to load current user");
            JsonResponse::server_error("Database error").into_response()
        }
    }
}
