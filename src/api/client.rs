use crate::config::DeviceConfig;
use crate::error::{AppError, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// HTTP client for the device's REST API
#[derive(Clone)]
pub struct DeviceClient {
    base_url: String,
    events_path: String,
    http: reqwest::Client,
    feed: reqwest::Client,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        // The event feed never completes, so only the connect phase is bounded
        let feed = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            events_path: config.events_path.clone(),
            http,
            feed,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Make a PUT request with a JSON body and deserialize the response
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "PUT");

        let response = self.http.put(&url).json(body).send().await?;

        self.handle_response(response).await
    }

    /// Open the long-lived event feed; the body is read by the caller
    pub async fn open_event_feed(&self) -> Result<reqwest::Response> {
        let response = self.feed.get(self.url(&self.events_path)).send().await?;

        Self::check_status(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| AppError::Payload(e.to_string()))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}
