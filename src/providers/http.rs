//! Authenticated JSON-over-HTTP plumbing shared by the provider adapters.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::{de::DeserializeOwned, Serialize};

use super::{ProviderError, Result};

/// Bearer-authenticated client rooted at an API base URL.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ApiClient {
    pub(crate) fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Resolves an endpoint path (or absolute paging URL) against the base.
    pub(crate) fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.base_url, endpoint)
        }
    }

    /// Builds authorization headers for API requests.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let headers = self.auth_headers()?;

        let response = self
            .client
            .get(self.url(endpoint))
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        handle_response(response).await
    }

    /// Makes an authenticated POST request with a JSON body.
    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(self.url(endpoint))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        handle_response(response).await
    }
}

/// Handles API response, checking for errors.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(handle_error(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::Internal(format!("parse response: {}", e)))
}

/// Handles API error responses.
async fn handle_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let retry_after_secs = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 => ProviderError::Authentication(format!("unauthorized: {}", body)),
        400 => ProviderError::InvalidRequest(body),
        404 => ProviderError::NotFound(body),
        429 => ProviderError::RateLimited { retry_after_secs },
        _ => ProviderError::Provider(format!("API error ({}): {}", status, body)),
    }
}

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
