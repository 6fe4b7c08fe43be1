//! Stand-in adapters for YouTube, Twitter and TikTok
//!
//! These have no real integration. They sleep for a configurable latency,
//! fail at a configurable rate and hand back synthetic ids of the form
//! `<platform>_<uuid>`. Replace them with Graph-style adapters (see
//! [`facebook`](super::facebook)) when real integrations are written.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::SimulatedConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::platforms::{Platform, SubmitRequest};
use crate::types::{CredentialRecord, PlatformKind};

pub struct SimulatedPlatform {
    kind: PlatformKind,
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedPlatform {
    /// `failure_rate` is clamped to `0.0..=1.0`
    pub fn new(kind: PlatformKind, latency: Duration, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };

        Self {
            kind,
            latency,
            failure_rate,
        }
    }

    pub fn from_config(kind: PlatformKind, config: &SimulatedConfig) -> Self {
        Self::new(
            kind,
            Duration::from_millis(config.latency_ms),
            config.failure_rate,
        )
    }

    /// Roll the dice before any await; the thread RNG cannot cross one
    fn roll_failure(&self) -> bool {
        rand::thread_rng().gen_bool(self.failure_rate)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl Platform for SimulatedPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    async fn verify(&self, credential: &CredentialRecord) -> PlatformResult<()> {
        if credential.token().trim().is_empty() {
            return Err(PlatformError::NotConnected(format!(
                "{} credential has an empty access token",
                self.kind
            )));
        }

        let failed = self.roll_failure();
        self.simulate_latency().await;

        if failed {
            Err(PlatformError::TokenExpired(format!(
                "simulated {} verification failure",
                self.kind
            )))
        } else {
            Ok(())
        }
    }

    async fn submit(&self, request: &SubmitRequest) -> PlatformResult<String> {
        let failed = self.roll_failure();
        self.simulate_latency().await;

        if failed {
            return Err(PlatformError::Api(format!(
                "simulated {} submission failure",
                self.kind
            )));
        }

        let id = format!("{}_{}", self.kind, uuid::Uuid::new_v4());
        debug!(post_id = %request.post_id, external_id = %id, "Simulated submission");
        Ok(id)
    }
}
