use axum::{
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    responses::{error_response, JsonResponse},
    routes::{auth::session::AuthSession, PageQuery},
    services::post_service::{CreatePostRequest, IdeaRequest, PostQuery, UpdatePostRequest},
    state::AppState,
};

pub async fn create_post(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<CreatePostRequest>,
) -> Response {
    match state
        .posts
        .create_post(workspace_id, session.user_id, payload)
        .await
    {
        Ok(created) => JsonResponse::created("Post created", created),
        Err(err) => error_response(&err),
    }
}

pub async fn get_posts(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<PostQuery>,
) -> Response {
    let filter = match query.to_filter() {
        Ok(filter) => filter,
        Err(err) => return error_response(&err),
    };
    match state
        .posts
        .get_posts(workspace_id, session.user_id, &filter)
        .await
    {
        Ok(posts) => JsonResponse::success_with_data("Posts", posts),
        Err(err) => error_response(&err),
    }
}

pub async fn get_post(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, post_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state
        .posts
        .get_post(workspace_id, session.user_id, post_id)
        .await
    {
        Ok(post) => JsonResponse::success_with_data("Post", post),
        Err(err) => error_response(&err),
    }
}

pub async fn update_post(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, post_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePostRequest>,
) -> Response {
    match state
        .posts
        .update_post(workspace_id, session.user_id, post_id, payload)
        .await
    {
        Ok(updated) => JsonResponse::success_with_data("Post updated", updated),
        Err(err) => error_response(&err),
    }
}

pub async fn delete_post(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, post_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state
        .posts
        .delete_post(workspace_id, session.user_id, post_id)
        .await
    {
        Ok(()) => JsonResponse::success("Post deleted").into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn list_drafts(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state
        .posts
        .list_drafts(workspace_id, session.user_id, query.page())
        .await
    {
        Ok(drafts) => JsonResponse::success_with_data("Drafts", drafts),
        Err(err) => error_response(&err),
    }
}

pub async fn create_idea(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<IdeaRequest>,
) -> Response {
    match state
        .posts
        .create_idea(workspace_id, session.user_id, payload)
        .await
    {
        Ok(idea) => JsonResponse::created("Idea created", idea),
        Err(err) => error_response(&err),
    }
}

pub async fn list_ideas(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Response {
    match state
        .posts
        .list_ideas(workspace_id, session.user_id, query.page())
        .await
    {
        Ok(ideas) => JsonResponse::success_with_data("Ideas", ideas),
        Err(err) => error_response(&err),
    }
}

pub async fn update_idea(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, idea_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<IdeaRequest>,
) -> Response {
    match state
        .posts
        .update_idea(workspace_id, session.user_id, idea_id, payload)
        .await
    {
        Ok(idea) => JsonResponse::success_with_data("Idea updated", idea),
        Err(err) => error_response(&err),
    }
}

pub async fn delete_idea(
    State(state): State<AppState>,
    session: AuthSession,
    Path((workspace_id, idea_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state
        .posts
        .delete_idea(workspace_id, session.user_id, idea_id)
        .await
    {
        Ok(()) => JsonResponse::success("Idea deleted").into_response(),
        Err(err) => error_response(&err),
    }
}

/// Accepts the multipart field `file`; other fields are ignored.
pub async fn upload_media(
    State(state): State<AppState>,
    session: AuthSession,
    Path(workspace_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(%workspace_id, error = %err, "malformed multipart upload");
                return JsonResponse::bad_request("Invalid multipart body").into_response();
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%workspace_id, error = %err, "failed to read uploaded file");
                return JsonResponse::bad_request("Could not read uploaded file").into_response();
            }
        };

        return match state
            .posts
            .upload_media(
                workspace_id,
                session.user_id,
                file_name,
                content_type,
                bytes.to_vec(),
            )
            .await
        {
            Ok(media) => JsonResponse::created("Media uploaded", media),
            Err(err) => error_response(&err),
        };
    }

    JsonResponse::bad_request("A file field is required").into_response()
}
