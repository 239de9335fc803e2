//! Session and token lifecycle client for the Cornucopia API
//!
//! Logs a user in, keeps the short-lived access token in a [`TokenStore`],
//! attaches bearer and CSRF headers to outgoing requests, and refreshes an
//! expired access token through the server's HttpOnly refresh cookie.
//!
//! The types here are single-threaded: session state lives in `Rc`/`RefCell`
//! fields and is never shared across threads.

pub mod client;
pub mod config;
pub mod csrf;
pub mod error;
pub mod jwt;
pub mod session;
pub mod token_store;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, ApiRequest, SessionExpiredHandler};
pub use crate::config::{ClientConfig, Endpoints, TokenStorage};
pub use csrf::CsrfManager;
pub use error::ClientError;
pub use jwt::{Claims, is_token_valid, parse_jwt};
pub use session::{AuthPhase, AuthSession, SessionAction, SessionState};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{LoginResponse, RefreshResponse, RegisterRequest, Session, UserProfile};
