use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::db::{is_unique_violation, user_repository::UserRepository};
use crate::models::workspace::{is_valid_email, normalize_email};
use crate::responses::{error_response, ApiError, JsonResponse};
use crate::routes::auth::session::{session_response, SESSION_LIFETIME};
use crate::state::AppState;
use crate::utils::password::{
    hash_password, is_acceptable_password, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupPayload {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub invite_token: Option<String>,
}

/// First word of the email's local part, lower-cased.
fn base_username(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let word: String = local
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|part| !part.is_empty())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if word.is_empty() {
        "user".to_string()
    } else {
        word
    }
}

/// `name`, `name1`, `name2`, ... until one is free.
pub async fn unique_username(
    users: &dyn UserRepository,
    email: &str,
) -> Result<String, sqlx::Error> {
    let base = base_username(email);
    if !users.is_username_taken(&base).await? {
        return Ok(base);
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{}{}", base, suffix);
        if !users.is_username_taken(&candidate).await? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

pub async fn handle_signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupPayload>,
) -> Response {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return JsonResponse::bad_request("Invalid email address").into_response();
    }
    if !is_acceptable_password(&payload.password) {
        return JsonResponse::bad_request(&format!(
            "Password must be between {} and {} characters",
            MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
        ))
        .into_response();
    }

    match state.users.is_email_taken(&email).await {
        Ok(true) => {
            return JsonResponse::conflict("An account with this email already exists")
                .into_response()
        }
        Ok(false) => {}
        Err(err) => {
            error!(?err, "failed to check email availability");
            return JsonResponse::server_error("Database error").into_response();
        }
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!(?err, "failed to hash password");
            return JsonResponse::server_error("Internal error").into_response();
        }
    };

    let username = match unique_username(state.users.as_ref(), &email).await {
        Ok(username) => username,
        Err(err) => {
            error!(?err, "failed to derive username");
            return JsonResponse::server_error("Database error").into_response();
        }
    };

    let user = match state
        .users
        .create_user(&email, &username, &password_hash)
        .await
    {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => {
            return JsonResponse::conflict("An account with this email already exists")
                .into_response()
        }
        Err(err) => {
            error!(?err, "failed to create user");
            return JsonResponse::server_error("Database error").into_response();
        }
    };

    // The account only exists together with its default workspace.
    if let Err(err) = state.workspaces.create_default_workspace(&user).await {
        if let Err(cleanup) = state.users.delete_user(user.id).await {
            error!(?cleanup, user_id = %user.id, "failed to roll back user after workspace error");
        }
        return error_response(&err);
    }
    info!(user_id = %user.id, "user signed up");

    let invite = match payload.invite_token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => Some(match state
            .workspaces
            .accept_invite_for(token, &user.email)
            .await
        {
            Ok(accepted) => json!({
                "accepted": true,
                "workspaceId": accepted.workspace_id,
            }),
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "invite could not be accepted at signup");
                let message = if err.status().is_server_error() {
                    "Invite could not be accepted".to_string()
                } else {
                    err.to_string()
                };
                json!({ "accepted": false, "message": message })
            }
        }),
        _ => None,
    };

    session_response(
        &state,
        &user,
        SESSION_LIFETIME,
        StatusCode::CREATED,
        "Account created",
        invite.map(|invite| json!({ "invite": invite })),
    )
}
