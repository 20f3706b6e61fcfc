//! Publish gateway that posts `{contentId, platform}` jobs to a webhook.
//!
//! In `sync` mode the response body is the [`PublishOutcome`]. In `callback`
//! mode any 2xx means accepted and the outcome is delivered later.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{error_body, http_client};
use crate::{
    config::{GatewayConfig, GatewayMode},
    content::{ChannelName, ContentId, PublishOutcome},
    gateway::{PublishDispatch, PublishGateway},
    Error, Result,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishJob<'a> {
    content_id: &'a str,
    platform: &'a str,
}

#[derive(Debug)]
pub struct WebhookPublishGateway {
    client: reqwest::Client,
    url: String,
    mode: GatewayMode,
}

impl WebhookPublishGateway {
    pub fn new(url: impl Into<String>, mode: GatewayMode, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            mode,
        })
    }

    /// Build from configuration. `gateway.webhook_url` must be set.
    pub fn from_config(config: &GatewayConfig, timeout: Duration) -> Result<Self> {
        let url = config
            .webhook_url
            .clone()
            .ok_or_else(|| Error::InvalidConfig("gateway.webhook_url is not set".to_string()))?;
        Self::new(url, config.mode, timeout)
    }

    #[must_use]
    pub const fn mode(&self) -> GatewayMode {
        self.mode
    }
}

#[async_trait]
impl PublishGateway for WebhookPublishGateway {
    async fn publish(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
    ) -> Result<PublishDispatch> {
        let job = PublishJob {
            content_id: content_id.as_str(),
            platform: channel.as_str(),
        };
        let failed = |reason: String| Error::ChannelPublishFailed {
            content_id: content_id.to_string(),
            channel: channel.to_string(),
            reason,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&job)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(error_body(response).await));
        }

        match self.mode {
            GatewayMode::Callback => Ok(PublishDispatch::Accepted),
            GatewayMode::Sync => {
                let outcome: PublishOutcome = response
                    .json()
                    .await
                    .map_err(|e| failed(format!("malformed outcome: {e}")))?;
                Ok(PublishDispatch::Completed(outcome))
            }
        }
    }
}
