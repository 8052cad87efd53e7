//! Shared HTTP plumbing for provider backends

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::config::ProviderKind;
use crate::error::LlmError;
use crate::utils::truncate_for_log;

/// HTTP client bound to one provider's base URL
#[derive(Debug, Clone)]
pub struct HttpClientBase {
    pub provider: ProviderKind,
    pub base_url: String,
    pub http: Client,
}

impl HttpClientBase {
    /// Build a client whose every request carries `timeout`
    pub fn new(provider: ProviderKind, base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(format!("ngdigest/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Build URL from base and path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Post JSON with bearer auth
    pub async fn post_bearer<Req, Res>(&self, url: &str, api_key: &str, body: &Req) -> Result<Res, LlmError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.send_json(self.http.post(url).bearer_auth(api_key).json(body))
            .await
    }

    /// Post JSON with caller-supplied headers
    pub async fn post_with_headers<Req, Res>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &Req,
    ) -> Result<Res, LlmError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.send_json(self.http.post(url).headers(headers).json(body))
            .await
    }

    /// Post JSON without auth
    pub async fn post_json<Req, Res>(&self, url: &str, body: &Req) -> Result<Res, LlmError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.send_json(self.http.post(url).json(body)).await
    }

    /// Send a request and decode a JSON body
    ///
    /// Non-2xx statuses become [`LlmError::Status`] (or `RateLimited`) with
    /// the body text attached so backends can inspect provider error codes.
    pub async fn send_json<Res>(&self, request: RequestBuilder) -> Result<Res, LlmError>
    where
        Res: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(LlmError::from_status(status, truncate_for_log(&body, 500)));
        }

        serde_json::from_str(&body).map_err(|e| {
            LlmError::InvalidResponse(format!(
                "{} returned unexpected body ({e}): {}",
                self.provider,
                truncate_for_log(&body, 200)
            ))
        })
    }
}
