use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::models::channel::Platform;
use crate::services::storage::ContentStorage;

use super::{
    PlatformAdapter, PlatformError, PublishMedia, PublishOutcome, PublishRequest, TokenStatus,
};

const RESTLI_PROTOCOL_HEADER: &str = "X-Restli-Protocol-Version";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const UPLOAD_MECHANISM: &str = "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest";

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
}

#[derive(Debug, Deserialize)]
struct RegisterUploadResponse {
    value: RegisterUploadValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterUploadValue {
    asset: String,
    upload_mechanism: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaCategory {
    Image,
    Video,
}

impl MediaCategory {
    fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            MediaCategory::Video
        } else {
            MediaCategory::Image
        }
    }

    fn share_category(self) -> &'static str {
        match self {
            MediaCategory::Image => "IMAGE",
            MediaCategory::Video => "VIDEO",
        }
    }

    fn recipe(self) -> &'static str {
        match self {
            MediaCategory::Image => "urn:li:digitalmediaRecipe:feedshare-image",
            MediaCategory::Video => "urn:li:digitalmediaRecipe:feedshare-video",
        }
    }
}

/// Publishes through the UGC API: profile lookup, optional asset upload, then post creation.
pub struct LinkedInAdapter {
    client: Client,
    api_base: String,
    storage: Arc<dyn ContentStorage>,
}

impl LinkedInAdapter {
    pub fn new(client: Client, api_base: &str, storage: Arc<dyn ContentStorage>) -> Self {
        Self {
            client,
            api_base: api_base.to_string(),
            storage,
        }
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserInfo, PlatformError> {
        let response = self
            .client
            .get(build_url(&self.api_base, "/v2/userinfo"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;
        read_json(ensure_success(response, "userinfo").await?, "userinfo").await
    }

    async fn upload_media(
        &self,
        token: &str,
        author: &str,
        media: &PublishMedia,
    ) -> Result<(String, MediaCategory), PlatformError> {
        let bytes = self
            .storage
            .fetch(&media.key)
            .await
            .map_err(|err| PlatformError::Media(err.to_string()))?;
        let category = MediaCategory::from_content_type(&media.content_type);

        let body = json!({
            "registerUploadRequest": {
                "recipes": [category.recipe()],
                "owner": author,
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }]
            }
        });
        let response = self
            .client
            .post(build_url(&self.api_base, "/v2/assets?action=registerUpload"))
            .bearer_auth(token)
            .header(RESTLI_PROTOCOL_HEADER, RESTLI_PROTOCOL_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let registered: RegisterUploadResponse =
            read_json(ensure_success(response, "registerUpload").await?, "registerUpload").await?;

        let upload_url = registered
            .value
            .upload_mechanism
            .get(UPLOAD_MECHANISM)
            .and_then(|m| m.get("uploadUrl"))
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::InvalidResponse {
                platform: Platform::Linkedin,
                step: "registerUpload",
                message: "missing uploadUrl".to_string(),
            })?
            .to_string();

        let response = self
            .client
            .put(upload_url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, media.content_type.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(network_error)?;
        ensure_success(response, "upload").await?;

        Ok((registered.value.asset, category))
    }

    async fn create_post(
        &self,
        token: &str,
        author: &str,
        text: &str,
        asset: Option<(String, MediaCategory)>,
    ) -> Result<Option<String>, PlatformError> {
        let mut share = json!({
            "shareCommentary": { "text": text },
            "shareMediaCategory": "NONE"
        });
        if let Some((asset, category)) = asset {
            share["shareMediaCategory"] = json!(category.share_category());
            share["media"] = json!([{ "status": "READY", "media": asset }]);
        }

        let body = json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
        });

        let response = self
            .client
            .post(build_url(&self.api_base, "/v2/ugcPosts"))
            .bearer_auth(token)
            .header(RESTLI_PROTOCOL_HEADER, RESTLI_PROTOCOL_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let response = ensure_success(response, "ugcPosts").await?;

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if header_id.is_some() {
            return Ok(header_id);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(body.get("id").and_then(Value::as_str).map(str::to_string))
    }
}

#[async_trait]
impl PlatformAdapter for LinkedInAdapter {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome, PlatformError> {
        let profile = self.fetch_profile(&request.access_token).await?;
        let author = format!("urn:li:person:{}", profile.sub);

        let asset = match &request.media {
            Some(media) => Some(
                self.upload_media(&request.access_token, &author, media)
                    .await?,
            ),
            None => None,
        };

        let external_id = self
            .create_post(&request.access_token, &author, &request.content, asset)
            .await?;
        info!(channel_id = %request.channel_id, ?external_id, "published to linkedin");
        Ok(PublishOutcome::Published { external_id })
    }

    async fn check_token(&self, access_token: &str) -> Result<TokenStatus, PlatformError> {
        match self.fetch_profile(access_token).await {
            Ok(_) => Ok(TokenStatus::Valid),
            Err(PlatformError::UnexpectedStatus {
                status, message, ..
            }) => {
                warn!(status, "linkedin token rejected");
                Ok(TokenStatus::Invalid { status, message })
            }
            Err(err) => Err(err),
        }
    }
}

fn build_url(base: &str, path: &str) -> String {
    let trimmed_base = base.trim_end_matches('/');
    if path.is_empty() {
        trimmed_base.to_string()
    } else {
        let trimmed_path = path.trim_start_matches('/');
        format!("{}/{}", trimmed_base, trimmed_path)
    }
}

fn network_error(err: reqwest::Error) -> PlatformError {
    PlatformError::Network {
        platform: Platform::Linkedin,
        message: err.to_string(),
    }
}

async fn ensure_success(response: Response, step: &'static str) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::UnexpectedStatus {
        platform: Platform::Linkedin,
        step,
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    step: &'static str,
) -> Result<T, PlatformError> {
    response
        .json::<T>()
        .await
        .map_err(|err| PlatformError::InvalidResponse {
            platform: Platform::Linkedin,
            step,
            message: err.to_string(),
        })
}

fn extract_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct LinkedInErrorBody {
        message: Option<String>,
        error_description: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<LinkedInErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error_description) {
            if !message.trim().is_empty() {
                return message;
            }
        }
    }

    let fallback = body.trim();
    if fallback.is_empty() {
        "LinkedIn request failed".to_string()
    } else {
        fallback.to_string()
    }
}
