//! Cornucopia API client
//!
//! [`ApiClient`] owns the token store and the CSRF cache for one session. Every
//! request goes through [`ApiClient::send`], which attaches credentials and
//! applies the refresh-and-replay policies:
//!
//! - a 401 triggers one access token refresh through the HttpOnly refresh
//!   cookie, then the request is replayed;
//! - a 403 mentioning CSRF triggers one CSRF token refresh, then the request
//!   is replayed.
//!
//! Each policy fires at most once per request.

pub mod auth;

use crate::config::{ClientConfig, DEFAULT_TIMEOUT_SECS, Endpoints};
use crate::csrf::CsrfManager;
use crate::error::ClientError;
use crate::token_store::{MemoryTokenStore, TokenStore};
use reqwest::{ClientBuilder, Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

/// Callback fired when the session is cleared after a failed refresh
pub type SessionExpiredHandler = Rc<dyn Fn()>;

const CSRF_REQUIRED_MESSAGE: &str =
    "Unable to obtain CSRF token for security. Please refresh the page and try again.";
const CSRF_UNAVAILABLE_MESSAGE: &str =
    "Security token unavailable. Please refresh the page and try again.";

/// A replayable API request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// State-changing verbs carry a CSRF token
    pub fn is_mutating(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

/// Which recovery policies have already fired for a request
#[derive(Debug, Default, Clone, Copy)]
struct RetryState {
    token_refreshed: bool,
    csrf_refreshed: bool,
}

/// Session-aware API client
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Rc<dyn TokenStore>,
    csrf: CsrfManager,
    on_session_expired: RefCell<Option<SessionExpiredHandler>>,
}

impl ApiClient {
    /// Create a client with in-memory token storage and default settings
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a client from loaded configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        Self::builder()
            .base_url(config.base_url()?)
            .timeout(config.timeout())
            .token_store(config.token_store()?)
            .build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Token store shared with the session controller
    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    /// CSRF token cache
    pub const fn csrf(&self) -> &CsrfManager {
        &self.csrf
    }

    /// Register the callback fired when a failed refresh ends the session
    pub fn on_session_expired(&self, handler: SessionExpiredHandler) {
        *self.on_session_expired.borrow_mut() = Some(handler);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Plain request builder without session credentials
    fn raw_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.request(method, self.url(path));

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request
    }

    /// Build one attempt of `request` with the current credentials
    async fn authorize(&self, request: &ApiRequest) -> Result<reqwest::RequestBuilder, ClientError> {
        let mut builder = self.raw_request(request.method.clone(), &request.path);

        if let Some(token) = self.tokens.access_token() {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        if request.is_mutating() {
            let csrf_token = self.csrf_token_for(request).await?;
            builder = builder.header(Endpoints::CSRF_HEADER, csrf_token);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder)
    }

    async fn csrf_token_for(&self, request: &ApiRequest) -> Result<String, ClientError> {
        match self.csrf.token().await {
            Ok(token) => Ok(token),
            Err(e) => {
                warn!("Failed to get CSRF token: {e}");
                if Endpoints::is_credential_endpoint(&request.path) {
                    return Err(ClientError::Security(CSRF_REQUIRED_MESSAGE.into()));
                }
                self.csrf.refresh_token().await.map_err(|e| {
                    warn!("Failed to refresh CSRF token: {e}");
                    ClientError::Security(CSRF_UNAVAILABLE_MESSAGE.into())
                })
            }
        }
    }

    /// Send a request, applying the refresh and CSRF replay policies
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ClientError> {
        let mut retry = RetryState::default();

        loop {
            let response = self.authorize(request).await?.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let error = ClientError::from_response(response).await;

            if status == StatusCode::UNAUTHORIZED
                && !retry.token_refreshed
                && !Endpoints::is_credential_endpoint(&request.path)
            {
                retry.token_refreshed = true;
                match self.refresh_access_token().await {
                    Ok(_) => {
                        debug!(path = %request.path, "Access token refreshed, replaying request");
                        continue;
                    }
                    Err(refresh_error) => {
                        warn!("Token refresh failed, ending session: {refresh_error}");
                        self.expire_session();
                        return Err(ClientError::SessionExpired(refresh_error.to_string()));
                    }
                }
            }

            if error.is_csrf_rejection() && !retry.csrf_refreshed {
                retry.csrf_refreshed = true;
                debug!(path = %request.path, "CSRF token rejected, refreshing");
                match self.csrf.refresh_token().await {
                    Ok(_) => {
                        debug!(path = %request.path, "CSRF token refreshed, replaying request");
                        continue;
                    }
                    Err(csrf_error) => {
                        warn!("Failed to refresh CSRF token after 403: {csrf_error}");
                        return Err(error);
                    }
                }
            }

            return Err(error);
        }
    }

    /// Send a request and decode the JSON response
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(&ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.execute(&ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.execute(&ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.execute(&ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(&ApiRequest::delete(path)).await
    }

    /// Clear the local session and notify the registered handler
    fn expire_session(&self) {
        self.tokens.clear_tokens();
        let handler = self.on_session_expired.borrow().clone();
        if let Some(handler) = handler {
            handler();
        }
    }
}

/// Builder for `ApiClient`
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    tokens: Option<Rc<dyn TokenStore>>,
}

impl ApiClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Use a specific token store instead of in-memory storage
    pub fn token_store(mut self, tokens: Rc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| concat!("cornucopia-client/", env!("CARGO_PKG_VERSION")).to_string());

        #[cfg(not(target_arch = "wasm32"))]
        let http = ClientBuilder::new()
            .user_agent(user_agent)
            .timeout(
                self.timeout
                    .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            )
            .cookie_store(true)
            .build()?;

        #[cfg(target_arch = "wasm32")]
        let http = {
            let _ = self.timeout; // Timeouts not supported on WASM
            ClientBuilder::new().user_agent(user_agent).build()?
        };

        let csrf = CsrfManager::new(http.clone(), &base_url);

        Ok(ApiClient {
            http,
            base_url,
            tokens: self
                .tokens
                .unwrap_or_else(|| Rc::new(MemoryTokenStore::new())),
            csrf,
            on_session_expired: RefCell::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        assert!(matches!(
            ApiClient::builder().build(),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            ApiClient::new("  "),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url(Endpoints::LOGIN), "http://localhost:8000/cornucopia/user/login");
    }

    #[test]
    fn test_mutating_verbs() {
        assert!(ApiRequest::post("/x").is_mutating());
        assert!(ApiRequest::put("/x").is_mutating());
        assert!(ApiRequest::patch("/x").is_mutating());
        assert!(ApiRequest::delete("/x").is_mutating());
        assert!(!ApiRequest::get("/x").is_mutating());
        assert!(!ApiRequest::new(Method::HEAD, "/x").is_mutating());
    }

    #[test]
    fn test_from_config_uses_selected_store() {
        let config = ClientConfig {
            api_base_url: Some("http://api.test/".into()),
            ..ClientConfig::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://api.test");
        assert!(client.tokens().access_token().is_none());
    }
}
