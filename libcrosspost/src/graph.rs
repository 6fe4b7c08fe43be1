//! Minimal Graph API client shared by the Facebook and Instagram adapters
//!
//! Every call is bearer-authenticated. Error envelopes of the form
//! `{"error": {"message": ..., "code": ...}}` are mapped onto
//! [`PlatformError`] kinds by [`PlatformError::from_graph_code`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::credentials::PageTokenFetcher;
use crate::error::{PlatformError, PlatformResult};
use crate::types::MediaKind;

/// Body of a media upload
#[derive(Debug, Clone)]
pub enum MediaPayload {
    /// Raw bytes sent as the multipart `source` part
    Bytes {
        data: Vec<u8>,
        file_name: String,
        mime_type: String,
    },
    /// Public URL the Graph API fetches itself
    Url(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
    /// Photo uploads return the feed story id here
    #[serde(default)]
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatusResponse {
    #[serde(default)]
    status_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    graph_url: String,
    api_version: String,
}

impl GraphClient {
    pub fn new(
        graph_url: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Option<Duration>,
    ) -> PlatformResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            graph_url: graph_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.into().trim_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.graph_url,
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    /// The user (or page, with a page token) the token belongs to
    pub async fn me(&self, token: &str) -> PlatformResult<GraphUser> {
        let response = self
            .http
            .get(self.url("me"))
            .bearer_auth(token)
            .query(&[("fields", "id,name")])
            .send()
            .await?;
        read_response(response).await
    }

    /// Exchange a user token for the page's own token
    pub async fn page_access_token(&self, user_token: &str, page_id: &str) -> PlatformResult<String> {
        let response = self
            .http
            .get(self.url(page_id))
            .bearer_auth(user_token)
            .query(&[("fields", "access_token")])
            .send()
            .await?;
        let body: PageTokenResponse = read_response(response).await?;

        body.access_token.ok_or_else(|| {
            PlatformError::PermissionDenied(format!(
                "no access token returned for page {}; the user may not manage it",
                page_id
            ))
        })
    }

    /// Text post to the feed of whoever owns `token`
    pub async fn post_feed(
        &self,
        token: &str,
        message: &str,
        scheduled_at: Option<i64>,
    ) -> PlatformResult<String> {
        let mut body = json!({ "message": message });
        apply_schedule(&mut body, scheduled_at);

        debug!(endpoint = "me/feed", "Posting to Graph API");
        let response = self
            .http
            .post(self.url("me/feed"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        read_response::<IdResponse>(response).await.map(IdResponse::into_post_id)
    }

    /// Photo or video post; `kind` picks `me/photos` or `me/videos`
    pub async fn post_media(
        &self,
        token: &str,
        kind: MediaKind,
        payload: MediaPayload,
        caption: &str,
        scheduled_at: Option<i64>,
    ) -> PlatformResult<String> {
        let (endpoint, caption_field, url_field) = match kind {
            MediaKind::Image => ("me/photos", "caption", "url"),
            MediaKind::Video => ("me/videos", "description", "file_url"),
            MediaKind::Other => {
                return Err(PlatformError::Validation(
                    "only image and video attachments can be uploaded".to_string(),
                ))
            }
        };

        debug!(endpoint, "Uploading media to Graph API");
        let request = self.http.post(self.url(endpoint)).bearer_auth(token);

        let request = match payload {
            MediaPayload::Bytes {
                data,
                file_name,
                mime_type,
            } => {
                let part = Part::bytes(data)
                    .file_name(file_name)
                    .mime_str(&mime_type)
                    .map_err(|e| PlatformError::MediaUpload(e.to_string()))?;
                let mut form = Form::new().text(caption_field, caption.to_string());
                if let Some(at) = scheduled_at {
                    form = form
                        .text("published", "false")
                        .text("scheduled_publish_time", at.to_string());
                }
                request.multipart(form.part("source", part))
            }
            MediaPayload::Url(url) => {
                let mut body = json!({ url_field: url, caption_field: caption });
                apply_schedule(&mut body, scheduled_at);
                request.json(&body)
            }
        };

        let response = request.send().await?;
        read_response::<IdResponse>(response).await.map(IdResponse::into_post_id)
    }

    /// Step one of an Instagram publish: create a media container
    pub async fn create_media_container(
        &self,
        token: &str,
        ig_user_id: &str,
        kind: MediaKind,
        media_url: &str,
        caption: &str,
    ) -> PlatformResult<String> {
        let body = match kind {
            MediaKind::Image => json!({ "image_url": media_url, "caption": caption }),
            MediaKind::Video => {
                json!({ "video_url": media_url, "media_type": "REELS", "caption": caption })
            }
            MediaKind::Other => {
                return Err(PlatformError::Validation(
                    "Instagram only accepts image or video media".to_string(),
                ))
            }
        };

        let response = self
            .http
            .post(self.url(&format!("{}/media", ig_user_id)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        read_response::<IdResponse>(response).await.map(|r| r.id)
    }

    /// Processing state of a container, e.g. `IN_PROGRESS` or `FINISHED`
    pub async fn container_status(&self, token: &str, container_id: &str) -> PlatformResult<String> {
        let response = self
            .http
            .get(self.url(container_id))
            .bearer_auth(token)
            .query(&[("fields", "status_code")])
            .send()
            .await?;
        let body: ContainerStatusResponse = read_response(response).await?;
        Ok(body.status_code.unwrap_or_else(|| "UNKNOWN".to_string()))
    }

    /// Final step of an Instagram publish; returns the media id
    pub async fn publish_container(
        &self,
        token: &str,
        ig_user_id: &str,
        creation_id: &str,
    ) -> PlatformResult<String> {
        let response = self
            .http
            .post(self.url(&format!("{}/media_publish", ig_user_id)))
            .bearer_auth(token)
            .json(&json!({ "creation_id": creation_id }))
            .send()
            .await?;
        read_response::<IdResponse>(response).await.map(|r| r.id)
    }
}

#[async_trait]
impl PageTokenFetcher for GraphClient {
    async fn fetch_page_token(&self, user_token: &str, page_id: &str) -> PlatformResult<String> {
        self.page_access_token(user_token, page_id).await
    }
}

impl IdResponse {
    fn into_post_id(self) -> String {
        self.post_id.unwrap_or(self.id)
    }
}

fn apply_schedule(body: &mut Value, scheduled_at: Option<i64>) {
    if let (Some(at), Some(map)) = (scheduled_at, body.as_object_mut()) {
        map.insert("published".to_string(), Value::Bool(false));
        map.insert("scheduled_publish_time".to_string(), Value::from(at));
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> PlatformResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(map_graph_error(status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| PlatformError::Api(format!("unexpected Graph API response: {}", e)))
}

/// Translate a failed Graph API response into a [`PlatformError`]
pub fn map_graph_error(status: StatusCode, body: &str) -> PlatformError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            debug!(code = envelope.error.code, status = status.as_u16(), "Graph API error");
            PlatformError::from_graph_code(envelope.error.code, &envelope.error.message)
        }
        Err(_) => PlatformError::Api(format!("HTTP {}: {}", status.as_u16(), body.trim())),
    }
}
