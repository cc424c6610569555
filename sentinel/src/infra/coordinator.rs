//! HTTP client for the coordinator API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use sentinel_common::ProvisionResponse;
use serde::Deserialize;
use serde_json::json;

use crate::application::ports::CoordinatorApi;

#[derive(Debug, Deserialize)]
struct AuthMessageResponse {
    message: String,
}

pub struct HttpCoordinator {
    client: Client,
    base_url: String,
}

impl HttpCoordinator {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/agents/{path}", self.base_url)
    }
}

#[async_trait]
impl CoordinatorApi for HttpCoordinator {
    async fn generate_auth_message(&self, public_key: &str) -> Result<String> {
        let url = self.endpoint("gen-auth-msg");
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "publicKey": public_key }))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        anyhow::ensure!(status.is_success(), "auth message request failed: {status}");

        let body: AuthMessageResponse = resp.json().await.context("parsing auth message")?;
        Ok(body.message)
    }

    async fn provision_agent(
        &self,
        signup_token: &str,
        signature: &str,
        public_key: &str,
    ) -> Result<ProvisionResponse> {
        let url = self.endpoint("provision");
        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "signupToken": signup_token,
                "signature": signature,
                "publicKey": public_key,
            }))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        anyhow::ensure!(status.is_success(), "provision request failed: {status}");

        resp.json().await.context("parsing provision response")
    }
}
