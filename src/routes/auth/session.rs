use axum::{
    extract::FromRequestParts,
    http::{
        header::AUTHORIZATION,
        request::Parts,
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::user::{PublicUser, User};
use crate::responses::JsonResponse;
use crate::routes::auth::claims::{Claims, TokenUse};
use crate::state::AppState;

pub const AUTH_COOKIE: &str = "auth_token";
pub const SESSION_LIFETIME: Duration = Duration::days(7);
pub const REMEMBERED_SESSION_LIFETIME: Duration = Duration::days(30);

/// The authenticated principal of a guarded request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim().to_string())
    } else {
        None
    }
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || JsonResponse::unauthorized("Not authenticated").into_response();

        let token = bearer_token(&parts.headers)
            .or_else(|| {
                CookieJar::from_headers(&parts.headers)
                    .get(AUTH_COOKIE)
                    .map(|cookie| cookie.value().to_string())
            })
            .ok_or_else(unauthorized)?;

        let claims: Claims = state
            .jwt
            .verify(&token, TokenUse::Access)
            .map_err(|_| unauthorized())?;
        let user_id = claims.user_id().ok_or_else(unauthorized)?;

        Ok(AuthSession {
            user_id,
            email: claims.email,
        })
    }
}

/// The `auth_token` cookie. A zero lifetime expires it in the browser.
pub fn session_cookie(value: String, lifetime: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(lifetime)
        .build()
}

/// Signs a session for `user` and returns it as cookie + body.
pub fn session_response(
    state: &AppState,
    user: &User,
    lifetime: Duration,
    status: StatusCode,
    message: &str,
    extra: Option<serde_json::Value>,
) -> Response {
    let now = OffsetDateTime::now_utc();
    let exp = (now + lifetime).unix_timestamp() as usize;
    let token = match state.jwt.sign(Claims::access(user.id, &user.email, exp)) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(?err, user_id = %user.id, "failed to sign session token");
            return JsonResponse::server_error("Token generation failed").into_response();
        }
    };

    let jar = CookieJar::new().add(session_cookie(
        token.clone(),
        lifetime,
        state.config.auth_cookie_secure,
    ));

    let mut data = json!({
        "token": token,
        "user": PublicUser::from_user(user, now),
    });
    if let (Some(extra), Some(object)) = (extra, data.as_object_mut()) {
        if let Some(fields) = extra.as_object() {
            object.extend(fields.clone());
        }
    }

    (jar, JsonResponse::with_data(status, message, data)).into_response()
}
