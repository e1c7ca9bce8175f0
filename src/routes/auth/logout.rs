use axum::{extract::State, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use time::Duration;
use tracing::info;

use crate::responses::JsonResponse;
use crate::routes::auth::session::{session_cookie, AUTH_COOKIE};
use crate::state::AppState;

/// Sessions are stateless JWTs, so logging out only expires the cookie.
pub async fn handle_logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if jar.get(AUTH_COOKIE).is_some() {
        info!("session cookie cleared");
    }
    let jar = jar.add(session_cookie(
        String::new(),
        Duration::ZERO,
        state.config.auth_cookie_secure,
    ));
    (jar, JsonResponse::success("Logged out"))
}
