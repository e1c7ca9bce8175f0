use axum::{
    extract::{Path, Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{error, warn};

use crate::{
    responses::JsonResponse,
    services::storage::{content_type_for, validate_key, StorageError},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub expires: i64,
    pub signature: String,
}

/// Serves stored media behind a signed, expiring link.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<MediaQuery>,
) -> Response {
    let now = OffsetDateTime::now_utc();
    if validate_key(&key).is_err()
        || !state
            .media_signer
            .verify(&key, query.expires, &query.signature, now)
    {
        warn!(media_key = %key, "rejected media request");
        return JsonResponse::forbidden("Invalid or expired media link").into_response();
    }

    match state.storage.fetch(&key).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, HeaderValue::from_static(content_type_for(&key))),
                (CACHE_CONTROL, HeaderValue::from_static("private, max-age=300")),
            ],
            bytes,
        )
            .into_response(),
        Err(StorageError::NotFound) => JsonResponse::not_found("Media not found").into_response(),
        Err(StorageError::InvalidKey) => {
            JsonResponse::bad_request("Invalid media key").into_response()
        }
        Err(err) => {
            error!(?err, media_key = %key, "failed to read media");
            JsonResponse::server_error("Internal error").into_response()
        }
    }
}
