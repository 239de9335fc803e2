//! CLI configuration utilities

use anyhow::{Context, Result};
use cornucopia_client::{ClientConfig, TokenStorage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the default config file inside the state directory
const CONFIG_FILE: &str = "config.toml";

/// Name of the saved session inside the state directory
const SESSION_FILE: &str = "session.json";

/// Pick the state directory: explicit flag/env first, then the platform data dir
pub fn resolve_state_dir(state_dir: Option<PathBuf>) -> PathBuf {
    state_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cornucopia")
    })
}

/// Load client settings for the CLI.
///
/// The CLI always keeps its session on disk so that `login`, `status`, and
/// `logout` can run as separate processes.
pub fn load_settings(
    state_dir: &Path,
    config_file: Option<&Path>,
    base_url: Option<String>,
) -> Result<ClientConfig> {
    let config_path = config_file.map_or_else(|| state_dir.join(CONFIG_FILE), Path::to_path_buf);
    debug!("Loading configuration from: {}", config_path.display());

    let mut config = ClientConfig::load(Some(config_path.as_path()))
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if let Some(base_url) = base_url {
        config.api_base_url = Some(base_url);
    }

    config.token_storage = TokenStorage::File;
    if config.token_file.is_none() {
        config.token_file = Some(state_dir.join(SESSION_FILE));
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_dir_override() {
        let dir = PathBuf::from("/tmp/cornucopia-test");
        assert_eq!(resolve_state_dir(Some(dir.clone())), dir);
    }

    #[test]
    fn test_cli_settings_use_session_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_settings(
            temp_dir.path(),
            None,
            Some("http://localhost:8000".to_string()),
        )
        .unwrap();

        assert_eq!(config.token_storage, TokenStorage::File);
        assert_eq!(config.token_file, Some(temp_dir.path().join(SESSION_FILE)));
        assert_eq!(config.base_url().unwrap(), "http://localhost:8000");
    }

    #[test]
    fn test_config_file_is_read() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            "api_base_url = \"http://api.test\"\ntimeout_secs = 3\n",
        )
        .unwrap();

        let config = load_settings(temp_dir.path(), None, None).unwrap();
        assert_eq!(config.base_url().unwrap(), "http://api.test");
        assert_eq!(config.timeout_secs, 3);
    }
}
