//! Access token storage
//!
//! Two storage policies exist and a deployment picks exactly one:
//! [`MemoryTokenStore`] keeps the token for the lifetime of the process,
//! [`FileTokenStore`] persists it so a session survives a restart.
//!
//! Neither store can hold a refresh token. The refresh token is an HttpOnly
//! cookie that only the HTTP client's cookie jar ever sees.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage for the current access token and display username
pub trait TokenStore {
    /// Replace the stored access token
    fn set_tokens(&self, access_token: &str);

    /// Current access token, if any
    fn access_token(&self) -> Option<String>;

    /// Replace the stored display username
    fn set_username(&self, username: &str);

    /// Current display username, if any
    fn username(&self) -> Option<String>;

    /// Forget the access token and username
    fn clear_tokens(&self);
}

/// Session data held by a token store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Volatile store, reset whenever the process restarts
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    session: RefCell<StoredSession>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn set_tokens(&self, access_token: &str) {
        self.session.borrow_mut().access_token = Some(access_token.to_string());
    }

    fn access_token(&self) -> Option<String> {
        self.session.borrow().access_token.clone()
    }

    fn set_username(&self, username: &str) {
        self.session.borrow_mut().username = Some(username.to_string());
    }

    fn username(&self) -> Option<String> {
        self.session.borrow().username.clone()
    }

    fn clear_tokens(&self) {
        *self.session.borrow_mut() = StoredSession::default();
    }
}

/// Durable store backed by a JSON file.
///
/// Every change is written through to disk. Write failures are logged and the
/// in-memory copy stays authoritative for the running process.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    session: RefCell<StoredSession>,
}

impl FileTokenStore {
    /// Open the store at `path`, loading any session saved there.
    ///
    /// A missing, unreadable, or corrupt file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let session = load_session(&path);
        Self {
            path,
            session: RefCell::new(session),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        let session = self.session.borrow().clone();
        if let Err(e) = write_session(&self.path, &session) {
            warn!("Failed to persist session to {}: {e}", self.path.display());
        }
    }
}

impl TokenStore for FileTokenStore {
    fn set_tokens(&self, access_token: &str) {
        self.session.borrow_mut().access_token = Some(access_token.to_string());
        self.persist();
    }

    fn access_token(&self) -> Option<String> {
        self.session.borrow().access_token.clone()
    }

    fn set_username(&self, username: &str) {
        self.session.borrow_mut().username = Some(username.to_string());
        self.persist();
    }

    fn username(&self) -> Option<String> {
        self.session.borrow().username.clone()
    }

    fn clear_tokens(&self) {
        *self.session.borrow_mut() = StoredSession::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed session file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove session file {}: {e}", self.path.display()),
        }
    }
}

fn load_session(path: &Path) -> StoredSession {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StoredSession::default(),
        Err(e) => {
            warn!("Failed to read session file {}: {e}", path.display());
            return StoredSession::default();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!("Ignoring corrupt session file {}: {e}", path.display());
        StoredSession::default()
    })
}

fn write_session(path: &Path, session: &StoredSession) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(session)?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    // Owner read/write only, from the moment the file exists
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    // A file left by an older run may carry wider permissions
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.access_token(), None);

        store.set_tokens("token-1");
        store.set_username("alice");
        assert_eq!(store.access_token().as_deref(), Some("token-1"));
        assert_eq!(store.username().as_deref(), Some("alice"));

        store.set_tokens("token-2");
        assert_eq!(store.access_token().as_deref(), Some("token-2"));

        store.clear_tokens();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.username(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("session.json");

        let store = FileTokenStore::open(&path);
        store.set_tokens("persisted-token");
        store.set_username("alice");
        drop(store);

        let reopened = FileTokenStore::open(&path);
        assert_eq!(reopened.access_token().as_deref(), Some("persisted-token"));
        assert_eq!(reopened.username().as_deref(), Some("alice"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("refresh"));
    }

    #[test]
    fn test_file_store_clear_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        let store = FileTokenStore::open(&path);
        store.set_tokens("token");
        assert!(path.exists());

        store.clear_tokens();
        assert!(!path.exists());
        assert_eq!(FileTokenStore::open(&path).access_token(), None);

        // Clearing twice is harmless
        store.clear_tokens();
    }

    #[test]
    fn test_corrupt_file_is_treated_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileTokenStore::open(&path);
        assert_eq!(store.access_token(), None);
        assert_eq!(store.path(), path.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        FileTokenStore::open(&path).set_tokens("token");

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileTokenStore::open(&path);
        store.set_tokens("token");

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(std::fs::read_to_string(&path).unwrap().contains("token"));
    }
}
