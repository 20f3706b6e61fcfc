//! Login and refresh exchange against `/auth/login` and `/auth/refresh`.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{error_body, http_client, trim_base_url, Envelope};
use crate::{
    session::{Credential, IdentityProvider},
    Error, Result,
};

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime in milliseconds.
    expires: i64,
}

impl TokenGrant {
    fn into_credential(self) -> Credential {
        let credential = Credential::new(
            self.access_token,
            Utc::now() + Duration::milliseconds(self.expires),
        );
        match self.refresh_token {
            Some(refresh_token) => credential.with_refresh_token(refresh_token),
            None => credential,
        }
    }
}

pub struct RestIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
}

impl std::fmt::Debug for RestIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestIdentityProvider")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl RestIdentityProvider {
    pub fn new(
        base_url: &str,
        email: impl Into<String>,
        password: impl Into<String>,
        timeout: StdDuration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: trim_base_url(base_url),
            email: email.into(),
            password: password.into(),
        })
    }

    async fn exchange(&self, path: &str, body: serde_json::Value) -> Result<Credential> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::auth_unavailable(format!("{path}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::auth_unavailable(format!(
                "{path}: {}",
                error_body(response).await
            )));
        }

        let grant: Envelope<TokenGrant> = response.json().await.map_err(|e| {
            Error::auth_unavailable(format!("{path}: malformed token response: {e}"))
        })?;
        Ok(grant.data.into_credential())
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn login(&self) -> Result<Credential> {
        tracing::debug!(email = %self.email, "Logging in to identity provider");
        self.exchange(
            "/auth/login",
            json!({ "email": self.email, "password": self.password }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        self.exchange(
            "/auth/refresh",
            json!({ "refresh_token": refresh_token, "mode": "json" }),
        )
        .await
    }
}
