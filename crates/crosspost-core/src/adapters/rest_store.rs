//! Content store over a Directus-style REST items API.
//!
//! ```text
//! GET   {base}/items/{collection}/{id}
//! GET   {base}/items/{collection}?filter=<json>&sort=scheduled_at&limit=N
//! PATCH {base}/items/{collection}/{id}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{error_body, http_client, trim_base_url, Envelope};
use crate::{
    config::StoreConfig,
    content::{ContentId, ContentItem, ContentPatch},
    session::SessionCache,
    store::{ContentFilter, ContentStore},
    Error, Result,
};

pub struct RestContentStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    session: SessionCache,
}

impl std::fmt::Debug for RestContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestContentStore")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl RestContentStore {
    /// Build from configuration. `store.base_url` must be set.
    pub fn new(config: &StoreConfig, session: SessionCache) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("store.base_url is not set".to_string()))?;
        Ok(Self {
            client: http_client(Duration::from_secs(config.request_timeout_secs))?,
            base_url: trim_base_url(base_url),
            collection: config.collection.clone(),
            session,
        })
    }

    fn items_url(&self) -> String {
        format!("{}/items/{}", self.base_url, self.collection)
    }

    fn item_url(&self, id: &ContentId) -> String {
        format!("{}/{}", self.items_url(), id)
    }

    async fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        let credential = self.session.get_token().await?;
        Ok(request.bearer_auth(credential.token))
    }

    /// Map a non-success response to an error, invalidating rejected credentials.
    async fn check(&self, response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.session.invalidate().await;
                Err(Error::auth_unavailable(format!(
                    "store rejected credential for {what}: {}",
                    error_body(response).await
                )))
            }
            _ => Err(Error::store_unavailable(format!(
                "{what}: {}",
                error_body(response).await
            ))),
        }
    }
}

/// Directus filter for a dispatcher pass.
#[must_use]
pub fn directus_filter(filter: &ContentFilter) -> Value {
    let status = json!({ "status": { "_eq": filter.status.to_string() } });
    match filter.due_before {
        Some(now) => json!({
            "_and": [
                status,
                { "_or": [
                    { "scheduled_at": { "_lte": now.to_rfc3339() } },
                    { "scheduled_at": { "_null": true } }
                ] }
            ]
        }),
        None => status,
    }
}

#[async_trait]
impl ContentStore for RestContentStore {
    async fn get_content_item(&self, id: &ContentId) -> Result<ContentItem> {
        let what = format!("content item '{id}'");
        let request = self.authorized(self.client.get(self.item_url(id))).await?;
        let response = self.check(request.send().await?, &what).await?;
        let envelope: Envelope<ContentItem> = response.json().await?;
        Ok(envelope.data)
    }

    async fn list_due(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>> {
        let query = [
            ("filter", directus_filter(filter).to_string()),
            ("sort", "scheduled_at".to_string()),
            ("limit", filter.limit.to_string()),
        ];
        let request = self
            .authorized(self.client.get(self.items_url()).query(&query))
            .await?;
        let response = self.check(request.send().await?, "content listing").await?;
        let envelope: Envelope<Vec<Value>> = response.json().await?;

        let mut items = Vec::with_capacity(envelope.data.len());
        for raw in envelope.data {
            match serde_json::from_value::<ContentItem>(raw) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed content item"),
            }
        }
        Ok(items)
    }

    async fn patch_content_item(&self, id: &ContentId, patch: &ContentPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let what = format!("content item '{id}'");
        let request = self
            .authorized(self.client.patch(self.item_url(id)).json(patch))
            .await?;
        self.check(request.send().await?, &what).await?;
        Ok(())
    }
}
