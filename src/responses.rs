use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Uniform `{status, message, code?, data?}` envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl JsonResponse {
    pub fn error(status: StatusCode, msg: &str, code: Option<&str>) -> Response {
        (
            status,
            Json(JsonResponse {
                status: false,
                message: msg.to_string(),
                code: code.map(str::to_string),
                data: None,
            }),
        )
            .into_response()
    }

    pub fn success(msg: &str) -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(JsonResponse {
                status: true,
                message: msg.to_string(),
                code: None,
                data: None,
            }),
        )
    }

    pub fn success_with_data<T: Serialize>(msg: &str, data: T) -> Response {
        Self::with_data(StatusCode::OK, msg, data)
    }

    pub fn created<T: Serialize>(msg: &str, data: T) -> Response {
        Self::with_data(StatusCode::CREATED, msg, data)
    }

    /// Data-carrying response with an arbitrary status, used for batch results.
    pub fn with_data<T: Serialize>(status: StatusCode, msg: &str, data: T) -> Response {
        match serde_json::to_value(data) {
            Ok(value) => (
                status,
                Json(JsonResponse {
                    status: status.is_success(),
                    message: msg.to_string(),
                    code: None,
                    data: Some(value),
                }),
            )
                .into_response(),
            Err(err) => {
                tracing::error!(?err, "failed to serialize response payload");
                Self::server_error("Internal error").into_response()
            }
        }
    }

    pub fn not_found(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::NOT_FOUND, msg, None)
    }

    pub fn conflict(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::CONFLICT, msg, None)
    }

    pub fn server_error(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, msg, None)
    }

    pub fn unauthorized(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::UNAUTHORIZED, msg, None)
    }

    pub fn bad_request(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::BAD_REQUEST, msg, None)
    }

    pub fn too_many_requests(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::TOO_MANY_REQUESTS, msg, None)
    }

    pub fn forbidden(msg: &str) -> impl IntoResponse {
        Self::error(StatusCode::FORBIDDEN, msg, None)
    }

    pub fn with_code(status: StatusCode, msg: &str, code: &str) -> impl IntoResponse {
        Self::error(status, msg, Some(code))
    }
}

/// Service errors that know their HTTP status and optional machine code.
pub trait ApiError: std::fmt::Debug + std::fmt::Display {
    fn status(&self) -> StatusCode;

    fn code(&self) -> Option<&'static str> {
        None
    }
}

/// Maps a service error onto the envelope. Server-side failures are logged and
/// reported with a generic message.
pub fn error_response<E: ApiError>(err: &E) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(?err, "request failed");
        return JsonResponse::error(status, "Internal error", err.code());
    }
    JsonResponse::error(status, &err.to_string(), err.code())
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use serde_json::{from_slice, json};

    use crate::responses::JsonResponse;

    #[tokio::test]
    async fn test_success_response() {
        let resp = JsonResponse::success("ok").into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: JsonResponse = from_slice(&body).unwrap();
        assert!(json.status);
        assert_eq!(json.message, "ok");
        assert!(json.data.is_none());
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let resp = JsonResponse::forbidden("nope").into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: JsonResponse = from_slice(&body).unwrap();
        assert!(!json.status);
        assert_eq!(json.message, "nope");
    }

    #[tokio::test]
    async fn test_data_response_carries_payload() {
        let resp = JsonResponse::created("made", json!({ "id": 7 }));
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: JsonResponse = from_slice(&body).unwrap();
        assert!(json.status);
        assert_eq!(json.data, Some(json!({ "id": 7 })));
    }

    #[tokio::test]
    async fn test_error_code_is_serialized() {
        let resp = JsonResponse::with_code(
            StatusCode::EXPECTATION_FAILED,
            "mail failed",
            "mail_delivery_failed",
        )
        .into_response();
        assert_eq!(resp.status(), StatusCode::EXPECTATION_FAILED);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: JsonResponse = from_slice(&body).unwrap();
        assert_eq!(json.code.as_deref(), Some("mail_delivery_failed"));
    }

    #[derive(Debug)]
    struct Broken;

    impl std::fmt::Display for Broken {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("connection pool exhausted")
        }
    }

    impl crate::responses::ApiError for Broken {
        fn status(&self) -> StatusCode {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let resp = crate::responses::error_response(&Broken);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: JsonResponse = from_slice(&body).unwrap();
        assert_eq!(json.message, "Internal error");
    }
}
