//! Facebook platform implementation
//!
//! Page posts go through the Graph API with a page-scoped token. Posts to a
//! personal timeline cannot be made through the API and are handed to a
//! [`ShareHandoff`] supplied by the host application.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::credentials::CredentialManager;
use crate::error::{PlatformError, PlatformResult};
use crate::graph::{GraphClient, MediaPayload};
use crate::platforms::{Platform, ShareHandoff, SubmitRequest};
use crate::types::{CredentialRecord, MediaKind, MediaRef, MediaSource, PlatformKind};

pub struct FacebookPlatform {
    graph: GraphClient,
    credentials: Arc<CredentialManager>,
    share: Option<Arc<dyn ShareHandoff>>,
}

impl FacebookPlatform {
    pub fn new(graph: GraphClient, credentials: Arc<CredentialManager>) -> Self {
        Self {
            graph,
            credentials,
            share: None,
        }
    }

    pub fn with_share_handoff(mut self, share: Arc<dyn ShareHandoff>) -> Self {
        self.share = Some(share);
        self
    }

    async fn share_to_timeline(&self, request: &SubmitRequest) -> PlatformResult<String> {
        match &self.share {
            Some(share) => {
                debug!(post_id = %request.post_id, "Handing post to native share");
                share.share(&request.text, request.media.as_ref()).await
            }
            None => Err(PlatformError::Unsupported(
                "posting to a personal timeline needs a native share hand-off; set post_as_page to post to a Page"
                    .to_string(),
            )),
        }
    }

    async fn page_token(&self, user_id: &str, page_id: &str) -> PlatformResult<String> {
        self.credentials
            .get_page_access_token(user_id, page_id, &self.graph)
            .await
            .map_err(|e| e.into_platform_error())?
            .ok_or_else(|| PlatformError::NotConnected("facebook is not connected".to_string()))
    }

    async fn post_to_page(&self, token: &str, request: &SubmitRequest) -> PlatformResult<String> {
        let scheduled_at = request.options.scheduled_at;

        let Some(media) = request.media.as_ref() else {
            return self.graph.post_feed(token, &request.text, scheduled_at).await;
        };

        let kind = media.kind();
        if kind == MediaKind::Other {
            warn!(mime_type = %media.mime_type, "Unsupported attachment type, posting text only");
            return self.graph.post_feed(token, &request.text, scheduled_at).await;
        }

        match load_payload(media).await {
            Ok(payload) => {
                self.graph
                    .post_media(token, kind, payload, &request.text, scheduled_at)
                    .await
            }
            Err(e) => {
                warn!(uri = %media.uri, error = %e, "Media unreadable, falling back to a text post");
                self.graph.post_feed(token, &request.text, scheduled_at).await
            }
        }
    }
}

async fn load_payload(media: &MediaRef) -> PlatformResult<MediaPayload> {
    match media.source() {
        MediaSource::Remote(url) => Ok(MediaPayload::Url(url)),
        MediaSource::LocalFile(path) => {
            let data = tokio::fs::read(&path).await.map_err(|e| {
                PlatformError::MediaUpload(format!("cannot read {}: {}", path.display(), e))
            })?;
            Ok(MediaPayload::Bytes {
                data,
                file_name: media.file_name(),
                mime_type: media.mime_type.clone(),
            })
        }
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Facebook
    }

    async fn verify(&self, credential: &CredentialRecord) -> PlatformResult<()> {
        let me = self.graph.me(credential.token()).await?;
        debug!(provider_user_id = %me.id, "Verified Facebook token");
        Ok(())
    }

    async fn submit(&self, request: &SubmitRequest) -> PlatformResult<String> {
        if !request.options.post_as_page {
            return self.share_to_timeline(request).await;
        }

        let page_id = request
            .options
            .page_id
            .clone()
            .or_else(|| request.credential.page_id.clone())
            .ok_or_else(|| {
                PlatformError::Validation("posting as a Page requires a page id".to_string())
            })?;

        let token = self.page_token(request.user_id(), &page_id).await?;
        let result = self.post_to_page(&token, request).await;

        match &result {
            Ok(id) => info!(page_id = %page_id, external_id = %id, "Posted to Facebook Page"),
            Err(PlatformError::TokenExpired(_)) => {
                // The next dispatch refetches instead of reusing a dead token
                if let Err(e) = self
                    .credentials
                    .invalidate_page_token(request.user_id(), &page_id)
                    .await
                {
                    warn!(page_id = %page_id, error = %e, "Failed to invalidate page token");
                }
            }
            Err(_) => {}
        }

        result
    }
}
