use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, Method, Request,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use rand_core::RngCore;
use subtle::ConstantTimeEq;

use crate::responses::JsonResponse;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Double-submit check for cookie-authenticated mutations. Bearer callers carry
/// no ambient credential and are let through.
pub async fn validate_csrf(req: Request<Body>, next: Next) -> Response {
    let mutating = matches!(
        *req.method(),
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    );
    if !mutating || uses_bearer_auth(req.headers()) {
        return next.run(req).await;
    }

    let header_token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());
    let cookie_token = extract_csrf_from_cookie(req.headers());

    match (header_token, cookie_token) {
        (Some(header), Some(cookie))
            if !header.is_empty() && bool::from(header.as_bytes().ct_eq(cookie.as_bytes())) =>
        {
            next.run(req).await
        }
        _ => JsonResponse::forbidden("Missing or invalid CSRF token").into_response(),
    }
}

fn uses_bearer_auth(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.len() > 7 && v[..7].eq_ignore_ascii_case("bearer "))
        .unwrap_or(false)
}

fn extract_csrf_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|part| Cookie::parse_encoded(part.trim()).ok())
        .find(|cookie| cookie.name() == CSRF_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand_core::OsRng.fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

pub async fn get_csrf_token() -> Response {
    let token = generate_csrf_token();

    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .path("/")
        .same_site(SameSite::Strict)
        .http_only(true)
        .secure(true)
        .build();

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
        headers.insert(SET_COOKIE, value);
    }

    (headers, axum::Json(serde_json::json!({ "status": true, "csrfToken": token })))
        .into_response()
}
