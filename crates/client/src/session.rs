//! Authentication session controller
//!
//! [`AuthSession`] drives the login lifecycle on top of an [`ApiClient`] and
//! exposes a [`SessionState`] for the presentation layer to render. State
//! changes go through [`SessionState::reduce`].

use crate::client::{ApiClient, ApiRequest, SessionExpiredHandler};
use crate::error::ClientError;
use crate::jwt;
use crate::types::{LoginResponse, RegisterRequest, Session, UserProfile};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

/// Error shown after a failed token refresh ended the session
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Where the user is in the login flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPhase {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
}

/// State rendered by the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub phase: AuthPhase,
    pub username: Option<String>,
    pub error: Option<String>,
}

/// Session state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// A stored, unexpired token was found on mount
    Restore { username: String },
    LoginStarted,
    LoginSucceeded { username: String },
    LoginFailed(String),
    /// Account creation was rejected; the login phase is unchanged
    RegisterFailed(String),
    /// The server refused to refresh the access token
    Expired,
    Logout,
}

impl SessionState {
    #[must_use]
    pub fn reduce(self, action: SessionAction) -> Self {
        match action {
            SessionAction::Restore { username } | SessionAction::LoginSucceeded { username } => {
                Self {
                    phase: AuthPhase::Authenticated,
                    username: Some(username),
                    error: None,
                }
            }
            SessionAction::LoginStarted => Self {
                phase: AuthPhase::Authenticating,
                error: None,
                ..self
            },
            SessionAction::LoginFailed(message) => Self {
                phase: AuthPhase::Anonymous,
                username: None,
                error: Some(message),
            },
            SessionAction::RegisterFailed(message) => Self {
                error: Some(message),
                ..self
            },
            SessionAction::Expired => Self {
                phase: AuthPhase::Anonymous,
                username: None,
                error: Some(SESSION_EXPIRED_MESSAGE.to_string()),
            },
            SessionAction::Logout => Self::default(),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.phase == AuthPhase::Authenticating
    }
}

/// Login/logout controller for one user session.
///
/// The controller owns the client's session-expired callback, so a refresh
/// failure on any request made through its client ends the session here too.
pub struct AuthSession {
    client: ApiClient,
    state: Rc<RefCell<SessionState>>,
    on_expired: Rc<RefCell<Option<SessionExpiredHandler>>>,
}

impl AuthSession {
    pub fn new(client: ApiClient) -> Self {
        let state = Rc::new(RefCell::new(SessionState::default()));
        let on_expired: Rc<RefCell<Option<SessionExpiredHandler>>> = Rc::new(RefCell::new(None));

        let expired_state = Rc::clone(&state);
        let listener = Rc::clone(&on_expired);
        client.on_session_expired(Rc::new(move || {
            apply(&expired_state, SessionAction::Expired);
            let handler = listener.borrow().clone();
            if let Some(handler) = handler {
                handler();
            }
        }));

        Self {
            client,
            state,
            on_expired,
        }
    }

    pub const fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Register a callback fired after a failed refresh has ended the session
    pub fn on_session_expired(&self, handler: SessionExpiredHandler) {
        *self.on_expired.borrow_mut() = Some(handler);
    }

    fn dispatch(&self, action: SessionAction) {
        apply(&self.state, action);
    }

    /// Restore the session from the token store.
    ///
    /// An unexpired stored token makes the session authenticated; anything
    /// else clears the store.
    pub fn mount(&self) -> SessionState {
        let tokens = self.client.tokens();
        let token = tokens.access_token();

        match jwt::parse_jwt(token.as_deref()) {
            Some(claims) if jwt::is_token_valid(token.as_deref()) => {
                let username = tokens
                    .username()
                    .unwrap_or_else(|| claims.display_name().to_string());
                info!(%username, "Restored stored session");
                self.dispatch(SessionAction::Restore { username });
            }
            _ => {
                tokens.clear_tokens();
                self.dispatch(SessionAction::Logout);
            }
        }

        self.state()
    }

    /// Log in, recording a readable error on failure.
    ///
    /// A failed attempt also discards any previously stored token.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        self.dispatch(SessionAction::LoginStarted);

        match self.client.login(username, password).await {
            Ok(response) => {
                let username = self
                    .client
                    .tokens()
                    .username()
                    .unwrap_or_else(|| username.to_string());
                self.dispatch(SessionAction::LoginSucceeded { username });
                Ok(response)
            }
            Err(e) => {
                self.client.tokens().clear_tokens();
                self.dispatch(SessionAction::LoginFailed(e.login_message()));
                Err(e)
            }
        }
    }

    /// Log out on the server (best effort) and locally
    pub async fn logout(&self) {
        self.client.logout().await;
        self.dispatch(SessionAction::Logout);
    }

    /// Register a new account without logging in
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserProfile, ClientError> {
        self.client
            .register(request)
            .await
            .inspect_err(|e| self.dispatch(SessionAction::RegisterFailed(e.login_message())))
    }

    /// Send a request through the client
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ClientError> {
        self.client.send(request).await
    }

    /// Send a request and decode the JSON response
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        self.client.execute(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.client.get(path).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.client.post(path, body).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.client.put(path, body).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.client.patch(path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.client.delete(path).await
    }

    /// Snapshot of the session
    pub fn session(&self) -> Session {
        let state = self.state.borrow();
        Session {
            access_token: self.client.tokens().access_token(),
            username: state.username.clone(),
            is_logged_in: state.is_logged_in(),
        }
    }
}

fn apply(state: &RefCell<SessionState>, action: SessionAction) {
    debug!(?action, "Session transition");
    let current = state.take();
    *state.borrow_mut() = current.reduce(action);
}
