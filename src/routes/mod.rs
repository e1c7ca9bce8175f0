pub mod auth;
pub mod channels;
pub mod media;
pub mod posts;
pub mod workspaces;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;

use crate::models::post::Page;
use crate::state::AppState;
use crate::utils::csrf::{get_csrf_token, validate_csrf};

/// Upper bound for a single media upload.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// Mounted under `/api/auth`.
pub fn auth_routes() -> Router<AppState> {
    let csrf_protected_routes = Router::new()
        .route("/signup", post(auth::handle_signup))
        .route("/login", post(auth::handle_login))
        .route("/logout", post(auth::handle_logout))
        .layer(from_fn(validate_csrf));

    let unprotected_routes = Router::new()
        .route("/me", get(auth::handle_me))
        .route("/csrf-token", get(get_csrf_token));

    csrf_protected_routes.merge(unprotected_routes)
}

/// Mounted under `/api`.
pub fn api_routes() -> Router<AppState> {
    let workspace_routes = Router::new()
        .route("/", get(workspaces::list_workspaces))
        .route("/accept-invite", post(workspaces::accept_invite))
        .route(
            "/{workspace_id}",
            get(workspaces::get_workspace).patch(workspaces::update_workspace),
        )
        .route(
            "/{workspace_id}/members",
            get(workspaces::list_members).post(workspaces::add_members),
        )
        .route(
            "/{workspace_id}/members/{membership_id}",
            patch(workspaces::update_member).delete(workspaces::remove_member),
        )
        .route(
            "/{workspace_id}/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route(
            "/{workspace_id}/channels/{channel_id}",
            axum::routing::delete(channels::delete_channel),
        )
        .route(
            "/{workspace_id}/channels/{channel_id}/disconnect",
            post(channels::disconnect_channel),
        )
        .route(
            "/{workspace_id}/channels/{channel_id}/refresh",
            post(channels::refresh_channel),
        )
        .route(
            "/{workspace_id}/channels/{channel_id}/status",
            get(channels::channel_status),
        )
        .route(
            "/{workspace_id}/posts",
            get(posts::get_posts).post(posts::create_post),
        )
        .route(
            "/{workspace_id}/posts/{post_id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/{workspace_id}/drafts", get(posts::list_drafts))
        .route(
            "/{workspace_id}/ideas",
            get(posts::list_ideas).post(posts::create_idea),
        )
        .route(
            "/{workspace_id}/ideas/{idea_id}",
            patch(posts::update_idea).delete(posts::delete_idea),
        )
        .route(
            "/{workspace_id}/media",
            post(posts::upload_media).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(from_fn(validate_csrf));

    Router::new()
        .nest("/workspaces", workspace_routes)
        .route("/channels/platforms", get(channels::list_platforms))
        .route("/media/{*key}", get(media::serve_media))
}
