//! User authentication endpoints

use super::{ApiClient, ApiRequest};
use crate::config::Endpoints;
use crate::error::ClientError;
use crate::types::{LoginRequest, LoginResponse, RefreshResponse, RegisterRequest, UserProfile};
use tracing::{debug, info, warn};

impl ApiClient {
    /// Log in with a username and password.
    ///
    /// On success the access token and display username are stored. The
    /// refresh token arrives as an HttpOnly cookie; a `refresh_token` field in
    /// the body is ignored.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let request = ApiRequest::post(Endpoints::LOGIN).json(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let response: LoginResponse = self.execute(&request).await?;

        self.tokens.set_tokens(&response.access_token);
        self.tokens
            .set_username(response.username.as_deref().unwrap_or(username));

        info!(username = %response.username.as_deref().unwrap_or(username), "Logged in");
        Ok(response)
    }

    /// Exchange the refresh cookie for a new access token.
    ///
    /// Goes straight to the refresh endpoint without the replay policies, so a
    /// failing refresh can never trigger another refresh.
    pub async fn refresh_access_token(&self) -> Result<RefreshResponse, ClientError> {
        let response = self
            .raw_request(reqwest::Method::POST, Endpoints::REFRESH)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let refreshed: RefreshResponse = response.json().await?;
        self.tokens.set_tokens(&refreshed.access_token);
        debug!("Access token refreshed");
        Ok(refreshed)
    }

    /// End the session on the server and locally.
    ///
    /// The server call clears the refresh cookie. Its failure is logged and
    /// ignored; local tokens are cleared either way.
    pub async fn logout(&self) {
        if let Err(e) = self.send(&ApiRequest::post(Endpoints::LOGOUT)).await {
            warn!("Server logout failed, clearing client tokens anyway: {e}");
        }
        self.tokens.clear_tokens();
        info!("Logged out");
    }

    /// Create a new user account
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserProfile, ClientError> {
        let profile: UserProfile = self
            .execute(&ApiRequest::post(Endpoints::REGISTER).json(request)?)
            .await?;
        info!(username = %profile.username, "Registered new user");
        Ok(profile)
    }
}
