use std::sync::Arc;

use crate::config::Config;
use crate::db::user_repository::UserRepository;
use crate::services::channel_service::ChannelService;
use crate::services::post_service::PostService;
use crate::services::storage::{ContentStorage, UrlSigner};
use crate::services::workspace_service::WorkspaceService;
use crate::utils::jwt::{JwtKeyProvider, JwtKeys, JwtSettings};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub workspaces: Arc<WorkspaceService>,
    pub channels: Arc<ChannelService>,
    pub posts: Arc<PostService>,
    pub storage: Arc<dyn ContentStorage>,
    pub media_signer: Arc<UrlSigner>,
    pub jwt: Arc<JwtSettings>,
}

impl JwtKeyProvider for AppState {
    fn jwt_keys(&self) -> &JwtKeys {
        &self.jwt.keys
    }

    fn jwt_issuer(&self) -> &str {
        &self.jwt.issuer
    }

    fn jwt_audience(&self) -> &str {
        &self.jwt.audience
    }
}
