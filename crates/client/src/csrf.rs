//! CSRF token cache
//!
//! The server issues a CSRF token together with a double-submit cookie. The
//! token is fetched lazily, cached on the client, and refetched after the
//! server rejects it.

use crate::config::Endpoints;
use crate::error::ClientError;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::cell::RefCell;
use tracing::{debug, error};

/// Longest excerpt of an error body that ends up in the logs
const LOGGED_BODY_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct CsrfTokenResponse {
    #[serde(default)]
    csrf_token: Option<String>,
}

/// Caches the CSRF token for one API client
#[derive(Debug)]
pub struct CsrfManager {
    http: reqwest::Client,
    url: String,
    token: RefCell<Option<String>>,
}

impl CsrfManager {
    /// Create a manager that fetches from `base_url` using `http`
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            url: format!("{base_url}{}", Endpoints::CSRF_TOKEN),
            token: RefCell::new(None),
        }
    }

    /// Fetch a fresh token from the server and cache it
    pub async fn fetch_token(&self) -> Result<String, ClientError> {
        let request = self
            .http
            .get(&self.url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        let response = request.send().await.map_err(|e| {
            error!("Error fetching CSRF token: {e}");
            ClientError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(LOGGED_BODY_LIMIT).collect();
            error!(
                status = status.as_u16(),
                url = %self.url,
                "CSRF token fetch failed: {excerpt}"
            );

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ClientError::Network(
                    "CSRF endpoint not found. Check that the API server is reachable at the configured base URL.".into(),
                ));
            }
            return Err(ClientError::Network(format!(
                "Failed to fetch CSRF token: {status}"
            )));
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"));
        if !is_json {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(LOGGED_BODY_LIMIT).collect();
            error!("CSRF token endpoint returned non-JSON: {excerpt}");
            return Err(ClientError::Format(
                "CSRF token endpoint returned non-JSON response".into(),
            ));
        }

        let body = response.text().await?;
        let parsed: CsrfTokenResponse = serde_json::from_str(&body)?;
        let token = parsed
            .csrf_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ClientError::Format("CSRF token is empty".into()))?;

        debug!("CSRF token fetched successfully");
        *self.token.borrow_mut() = Some(token.clone());
        Ok(token)
    }

    /// Cached token, fetching one if none is cached yet
    pub async fn token(&self) -> Result<String, ClientError> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }
        self.fetch_token().await
    }

    /// Drop the cached token and fetch a new one
    pub async fn refresh_token(&self) -> Result<String, ClientError> {
        self.invalidate();
        self.fetch_token().await
    }

    /// JSON content type plus the CSRF header
    pub async fn headers(&self) -> Result<HeaderMap, ClientError> {
        let token = self.token().await?;
        let value = HeaderValue::from_str(&token)
            .map_err(|_| ClientError::Format("CSRF token is not a valid header value".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(HeaderName::from_static("x-csrf-token"), value);
        Ok(headers)
    }

    /// Currently cached token without touching the network
    pub fn cached(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    /// Forget the cached token
    pub fn invalidate(&self) {
        self.token.borrow_mut().take();
    }
}
