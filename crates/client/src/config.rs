//! Client configuration

use crate::error::ClientError;
use crate::token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CORNUCOPIA";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// API paths used by the client
pub struct Endpoints;

impl Endpoints {
    pub const LOGIN: &'static str = "/cornucopia/user/login";
    pub const REFRESH: &'static str = "/cornucopia/user/refresh";
    pub const LOGOUT: &'static str = "/cornucopia/user/logout";
    pub const REGISTER: &'static str = "/cornucopia/user/register";
    pub const CSRF_TOKEN: &'static str = "/cornucopia/security/csrf-token";

    /// Header carrying the CSRF token
    pub const CSRF_HEADER: &'static str = "X-CSRF-Token";

    /// Endpoints where a 401 means bad credentials and CSRF is mandatory
    pub fn is_credential_endpoint(path: &str) -> bool {
        path.contains("/login") || path.contains("/register")
    }
}

/// Where the access token is kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStorage {
    /// Process memory only
    #[default]
    Memory,
    /// JSON file on disk
    File,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the Cornucopia API
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Token storage policy
    #[serde(default)]
    pub token_storage: TokenStorage,

    /// Session file used by the `file` storage policy
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            token_storage: TokenStorage::default(),
            token_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from an optional TOML file layered under
    /// `CORNUCOPIA_*` environment variables.
    ///
    /// The result is not validated so callers can apply overrides first;
    /// building a client validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        Self::load_with_env(path, None)
    }

    /// `env` replaces the process environment when set
    fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ClientError> {
        let mut builder = config::Config::builder()
            .set_default("timeout_secs", DEFAULT_TIMEOUT_SECS)?
            .set_default("token_storage", "memory")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from environment variables only
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or a value cannot be parsed
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_env_map(None)
    }

    fn from_env_map(env: Option<config::Map<String, String>>) -> Result<Self, ClientError> {
        let config = Self::load_with_env(None, env)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can be used to build a client
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing, the timeout is zero, or
    /// file storage has no path
    pub fn validate(&self) -> Result<(), ClientError> {
        self.base_url()?;

        if self.timeout_secs == 0 {
            return Err(ClientError::Configuration(
                "timeout_secs must be greater than zero".into(),
            ));
        }

        if self.token_storage == TokenStorage::File && self.token_file.is_none() {
            return Err(ClientError::Configuration(
                "token_file is required when token_storage is 'file'".into(),
            ));
        }

        Ok(())
    }

    /// The configured base URL
    ///
    /// # Errors
    ///
    /// Returns an error if no non-blank base URL is set
    pub fn base_url(&self) -> Result<&str, ClientError> {
        match self.api_base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(ClientError::Configuration(format!(
                "{ENV_PREFIX}_API_BASE_URL is not defined. Set it in the environment or the config file."
            ))),
        }
    }

    /// Request timeout
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the token store selected by this configuration
    ///
    /// # Errors
    ///
    /// Returns an error if file storage is selected without a path
    pub fn token_store(&self) -> Result<Rc<dyn TokenStore>, ClientError> {
        match (self.token_storage, &self.token_file) {
            (TokenStorage::Memory, _) => Ok(Rc::new(MemoryTokenStore::new())),
            (TokenStorage::File, Some(path)) => Ok(Rc::new(FileTokenStore::open(path))),
            (TokenStorage::File, None) => Err(ClientError::Configuration(
                "token_file is required when token_storage is 'file'".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_base_url_is_fatal() {
        let config = ClientConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ClientError::Configuration(ref msg) if msg.contains("CORNUCOPIA_API_BASE_URL")));

        let config = ClientConfig {
            api_base_url: Some("   ".into()),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.toml");
        let session_path = temp_dir.path().join("session.json");
        std::fs::write(
            &path,
            format!(
                "api_base_url = \"http://localhost:8000\"\ntimeout_secs = 5\ntoken_storage = \"file\"\ntoken_file = \"{}\"\n",
                session_path.display()
            ),
        )
        .unwrap();

        let config = ClientConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.base_url().unwrap(), "http://localhost:8000");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.token_storage, TokenStorage::File);

        let store = config.token_store().unwrap();
        store.set_tokens("abc");
        assert!(session_path.exists());
    }

    #[test]
    fn test_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.toml");
        std::fs::write(&path, "api_base_url = \"http://api.test\"\n").unwrap();

        let config = ClientConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.token_storage, TokenStorage::Memory);
        assert!(config.token_store().unwrap().access_token().is_none());
    }

    fn env(vars: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            vars.iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_from_env_reads_prefixed_variables() {
        let config = ClientConfig::from_env_map(env(&[
            ("CORNUCOPIA_API_BASE_URL", "http://env.test"),
            ("CORNUCOPIA_TIMEOUT_SECS", "3"),
            ("UNRELATED_TIMEOUT_SECS", "99"),
        ]))
        .unwrap();

        assert_eq!(config.base_url().unwrap(), "http://env.test");
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.token_storage, TokenStorage::Memory);
    }

    #[test]
    fn test_from_env_without_base_url_is_fatal() {
        let err = ClientConfig::from_env_map(env(&[("CORNUCOPIA_TIMEOUT_SECS", "3")])).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(ref msg) if msg.contains("CORNUCOPIA_API_BASE_URL")));
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.toml");
        std::fs::write(&path, "api_base_url = \"http://file.test\"\ntimeout_secs = 5\n").unwrap();

        let config = ClientConfig::load_with_env(
            Some(path.as_path()),
            env(&[("CORNUCOPIA_API_BASE_URL", "http://env.test")]),
        )
        .unwrap();
        assert_eq!(config.base_url().unwrap(), "http://env.test");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_file_storage_requires_path() {
        let config = ClientConfig {
            api_base_url: Some("http://api.test".into()),
            token_storage: TokenStorage::File,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(config.token_store().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ClientConfig {
            api_base_url: Some("http://api.test".into()),
            timeout_secs: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credential_endpoints() {
        assert!(Endpoints::is_credential_endpoint(Endpoints::LOGIN));
        assert!(Endpoints::is_credential_endpoint(Endpoints::REGISTER));
        assert!(!Endpoints::is_credential_endpoint(Endpoints::LOGOUT));
        assert!(!Endpoints::is_credential_endpoint("/cornucopia/cart"));
    }
}
