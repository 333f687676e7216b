use anyhow::Context;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, Method, Response,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{api::types::ApiErrorBody, config::SessionConfig};

/// HTTP transport for the CohortFlow API.
///
/// Knows the base URL and how to move JSON; it holds no session state.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &SessionConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }

    pub fn new_with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn send_json<B>(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<Response, String>
    where
        B: Serialize + ?Sized,
    {
        self.client
            .request(method, self.endpoint(path))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))
    }
}

pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

pub(crate) async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, String> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("Failed to read response: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("Failed to parse response: {}", e))
}

/// Like `parse_json`, but an empty body yields the type's default.
pub(crate) async fn parse_json_or_default<T>(response: Response) -> Result<T, String>
where
    T: DeserializeOwned + Default,
{
    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("Failed to read response: {}", e))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| format!("Failed to parse response: {}", e))
}

/// Best-effort extraction of the server's error message.
pub(crate) async fn error_message(response: Response) -> Option<String> {
    let bytes = response.bytes().await.ok()?;
    serde_json::from_slice::<ApiErrorBody>(&bytes)
        .ok()
        .and_then(ApiErrorBody::into_message)
}
