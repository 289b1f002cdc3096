use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::app_dirs::AppDirs;

/// Access/refresh bearer tokens as issued by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Persistent home of the single live token pair.
///
/// Both tokens are written and removed together; there is no way to clear
/// just one of them.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<TokenPair>;
    fn save(&self, tokens: &TokenPair) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;

    fn access_token(&self) -> Option<String> {
        self.load().map(|t| t.access)
    }

    fn refresh_token(&self) -> Option<String> {
        self.load().map(|t| t.refresh)
    }
}

/// Token pair stored as JSON in the user's state directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::token_path().unwrap_or_else(|| PathBuf::from("derby_tokens.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<TokenPair> {
        let bytes = fs::read(&self.path).ok()?;
        match serde_json::from_slice::<TokenPair>(&bytes) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                log::warn!("ignoring unreadable token file {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Written to a private temp file next to the target and renamed over
    /// it, so readers see either the old pair or the new one.
    fn save(&self, tokens: &TokenPair) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let data = serde_json::to_vec_pretty(tokens).map_err(io::Error::other)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file().set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-process store, used by tests and by one-shot commands that must not
/// touch the user's session.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        Self {
            tokens: Mutex::new(Some(TokenPair {
                access: access.to_string(),
                refresh: refresh.to_string(),
            })),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenPair> {
        self.tokens.lock().ok()?.clone()
    }

    fn save(&self, tokens: &TokenPair) -> io::Result<()> {
        let mut slot = self
            .tokens
            .lock()
            .map_err(|_| io::Error::other("token store poisoned"))?;
        *slot = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        let mut slot = self
            .tokens
            .lock()
            .map_err(|_| io::Error::other("token store poisoned"))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    #[test]
    fn file_store_roundtrip_and_clear() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::with_path(dir.path().join("nested").join("tokens.json"));
        assert_eq!(store.load(), None);

        store.save(&pair("a1", "r1")).unwrap();
        assert_eq!(store.load(), Some(pair("a1", "r1")));
        assert_eq!(store.access_token().as_deref(), Some("a1"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));

        store.save(&pair("a2", "r2")).unwrap();
        assert_eq!(store.load(), Some(pair("a2", "r2")));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn file_store_ignores_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = FileTokenStore::with_path(&path);
        assert_eq!(store.load(), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private_to_the_user() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        // an older, world-readable file gets replaced, not reused
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileTokenStore::with_path(&path);
        store.save(&pair("a1", "r1")).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(store.load(), Some(pair("a1", "r1")));
    }

    #[test]
    fn file_store_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::with_path(dir.path().join("tokens.json"));
        store.save(&pair("a1", "r1")).unwrap();
        store.save(&pair("a2", "r2")).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn memory_store_clears_both_tokens() {
        let store = MemoryTokenStore::with_tokens("a", "r");
        assert!(store.access_token().is_some());
        store.clear().unwrap();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }
}
