//! Instagram platform implementation
//!
//! Publishing is a two-step container flow: create a container that points
//! at a public media URL, wait for Instagram to finish ingesting it, then
//! publish it. Text-only posts are not possible.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{PlatformError, PlatformResult};
use crate::graph::GraphClient;
use crate::platforms::{MediaHost, Platform, SubmitRequest};
use crate::types::{CredentialRecord, MediaKind, MediaSource, PlatformKind};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_POLL_ATTEMPTS: u32 = 10;

pub struct InstagramPlatform {
    graph: GraphClient,
    media_host: Option<Arc<dyn MediaHost>>,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl InstagramPlatform {
    pub fn new(graph: GraphClient) -> Self {
        Self {
            graph,
            media_host: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }

    pub fn with_media_host(mut self, host: Arc<dyn MediaHost>) -> Self {
        self.media_host = Some(host);
        self
    }

    pub fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts.max(1);
        self
    }

    async fn public_url(&self, source: MediaSource, mime_type: &str) -> PlatformResult<String> {
        match source {
            MediaSource::Remote(url) => Ok(url),
            MediaSource::LocalFile(path) => match &self.media_host {
                Some(host) => host.publish(&path, mime_type).await,
                None => Err(PlatformError::MediaUpload(format!(
                    "{} is a local file and Instagram needs a public URL; no media host is configured",
                    path.display()
                ))),
            },
        }
    }

    async fn wait_until_ready(&self, token: &str, container_id: &str) -> PlatformResult<()> {
        for attempt in 1..=self.poll_attempts {
            let status = self.graph.container_status(token, container_id).await?;
            debug!(container_id, attempt, status = %status, "Container status");

            match status.as_str() {
                "FINISHED" => return Ok(()),
                "ERROR" | "EXPIRED" => {
                    return Err(PlatformError::MediaUpload(format!(
                        "container {} ended in state {}",
                        container_id, status
                    )))
                }
                _ if attempt < self.poll_attempts => sleep(self.poll_interval).await,
                _ => {}
            }
        }

        Err(PlatformError::MediaUpload(format!(
            "container {} was not ready after {} checks",
            container_id, self.poll_attempts
        )))
    }
}

fn business_account(credential: &CredentialRecord) -> PlatformResult<&str> {
    credential.account_id.as_deref().ok_or_else(|| {
        PlatformError::Validation(
            "Instagram credentials are missing the business account id".to_string(),
        )
    })
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Instagram
    }

    async fn verify(&self, credential: &CredentialRecord) -> PlatformResult<()> {
        business_account(credential)?;
        self.graph.me(credential.token()).await?;
        Ok(())
    }

    async fn submit(&self, request: &SubmitRequest) -> PlatformResult<String> {
        let media = request.media.as_ref().ok_or_else(|| {
            PlatformError::Validation("Instagram requires media content".to_string())
        })?;

        let kind = media.kind();
        if kind == MediaKind::Other {
            return Err(PlatformError::Validation(format!(
                "Instagram only accepts image or video media, got {}",
                media.mime_type
            )));
        }

        let ig_user = business_account(&request.credential)?;
        let token = request.token();
        let media_url = self.public_url(media.source(), &media.mime_type).await?;

        let container = self
            .graph
            .create_media_container(token, ig_user, kind, &media_url, &request.text)
            .await?;
        self.wait_until_ready(token, &container).await?;

        let media_id = self.graph.publish_container(token, ig_user, &container).await?;
        info!(container_id = %container, media_id = %media_id, "Published to Instagram");
        Ok(media_id)
    }
}
