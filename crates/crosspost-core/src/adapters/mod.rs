//! Implementations of the store, identity and gateway boundaries.
//!
//! - `rest_store`: Directus-style items API over HTTP
//! - `rest_identity`: login/refresh exchange against the same service
//! - `static_credential`: long-lived token from configuration
//! - `webhook`: publish gateway that posts jobs to a webhook

pub mod rest_identity;
pub mod rest_store;
pub mod static_credential;
pub mod webhook;

pub use rest_identity::RestIdentityProvider;
pub use rest_store::RestContentStore;
pub use static_credential::EnvStaticCredential;
pub use webhook::WebhookPublishGateway;

use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// `{"data": ...}` response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::InvalidConfig(format!("Failed to create HTTP client: {e}")))
}

pub(crate) fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Body text of a failed response, for error messages.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    }
}
