//! Session storage backings.
//!
//! Every backing implements [`SessionStore`]. Callers hold the store behind an
//! `Arc` and re-read it on every operation instead of caching the session.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{Error, Result, Session};

/// Where the current session lives.
pub trait SessionStore: Send + Sync {
    /// Replace any stored session with `session`. Token, user and expiry land together.
    fn write(&self, session: &Session) -> Result<()>;

    /// Current session, or `None` if never written, cleared, or unreadable.
    fn read(&self) -> Option<Session>;

    /// Remove the session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<Session>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn write(&self, session: &Session) -> Result<()> {
        let mut slot = self
            .inner
            .lock()
            .map_err(|_| Error::Storage("memory store poisoned".to_string()))?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn read(&self) -> Option<Session> {
        self.inner.lock().ok()?.clone()
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .inner
            .lock()
            .map_err(|_| Error::Storage("memory store poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// Store for contexts with no persistent storage, such as pre-rendering.
///
/// Reads are always empty; writes fail with [`Error::StorageUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedStore;

impl SessionStore for DetachedStore {
    fn write(&self, _session: &Session) -> Result<()> {
        Err(Error::StorageUnavailable)
    }

    fn read(&self) -> Option<Session> {
        None
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Durable JSON-file store, one file per API origin.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under `dir` keyed by `origin` (e.g. `http://localhost:8000`).
    pub fn for_origin(dir: &Path, origin: &str) -> Self {
        let key: String = origin
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self::new(dir.join(format!("session_{}.json", key.trim_matches('_'))))
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileStore {
    fn write(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string(session)?;

        // Rename over the old file so a reader never sees half a session.
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, json.as_bytes())
            .map_err(|e| Error::Storage(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Storage(format!("replace {}: {e}", self.path.display())))
    }

    fn read(&self) -> Option<Session> {
        let json = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                None
            }
        }
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("remove {}: {e}", self.path.display()))),
        }
    }
}

/// Create `path` readable by the owner only, then write `bytes`.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    // A stale temp file would keep its old mode.
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
