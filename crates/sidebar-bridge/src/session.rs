//! Signed-in session and the key-value storage it survives reloads in.
//!
//! The store is the only shared mutable state the transports touch, and they
//! only read it: every outbound call asks for the token at send time, so a
//! login or logout is visible to the very next request.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::BaseDirs;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Storage key the session record lives under.
pub const SESSION_STORAGE_KEY: &str = "auth";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode storage: {0}")]
    Encode(String),
    #[error("failed to decode storage: {0}")]
    Decode(String),
    #[error("unable to determine home directory")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserRef,
}

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageFile {
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// TOML-backed storage file, readable only by the owner on unix.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn default_path() -> Result<PathBuf, StorageError> {
        let base = BaseDirs::new().ok_or(StorageError::NoDataDir)?;
        Ok(base.home_dir().join(".jobbyfy").join("storage"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StorageFile, StorageError> {
        if !self.path.exists() {
            return Ok(StorageFile::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        toml::from_str(&raw).map_err(|err| StorageError::Decode(err.to_string()))
    }

    /// Like `load`, but an unreadable file is replaced on the next write.
    fn load_for_write(&self) -> Result<StorageFile, StorageError> {
        match self.load() {
            Err(StorageError::Decode(reason)) => {
                warn!(target: "bridge.session", path = %self.path.display(), %reason, "overwriting unreadable storage file");
                Ok(StorageFile::default())
            }
            other => other,
        }
    }

    fn save(&self, file: &StorageFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized =
            toml::to_string_pretty(file).map_err(|err| StorageError::Encode(err.to_string()))?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut handle = options.open(&self.path)?;
        handle.write_all(serialized.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = handle.metadata()?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let mut file = self.load_for_write()?;
        file.entries.insert(key.to_string(), value.to_string());
        self.save(&file)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        match self.load() {
            Ok(mut file) => {
                if file.entries.remove(key).is_some() {
                    self.save(&file)?;
                }
                Ok(())
            }
            Err(StorageError::Decode(reason)) => {
                warn!(target: "bridge.session", path = %self.path.display(), %reason, "clearing unreadable storage file");
                self.save(&StorageFile::default())
            }
            Err(err) => Err(err),
        }
    }
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    /// Restores whatever session the storage holds. A record or storage file
    /// that no longer parses is treated as signed out.
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Result<Self, StorageError> {
        let stored = match storage.get(SESSION_STORAGE_KEY) {
            Err(StorageError::Decode(reason)) => {
                warn!(target: "bridge.session", %reason, "storage is unreadable; starting signed out");
                None
            }
            other => other?,
        };
        let current = match stored {
            Some(raw) => match serde_json::from_str::<Session>(&raw) {
                Ok(session) => {
                    debug!(target: "bridge.session", user = %session.user.email, "restored session");
                    Some(session)
                }
                Err(err) => {
                    warn!(target: "bridge.session", error = %err, "discarding unreadable session record");
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            storage,
            current: RwLock::new(current),
        })
    }

    /// A store that forgets everything when the process exits.
    pub fn ephemeral() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            current: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|session| session.token.clone())
            .filter(|token| !token.is_empty())
    }

    pub fn user(&self) -> Option<UserRef> {
        self.current.read().as_ref().map(|session| session.user.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }

    pub fn sign_in(&self, session: Session) -> Result<(), StorageError> {
        let raw =
            serde_json::to_string(&session).map_err(|err| StorageError::Encode(err.to_string()))?;
        self.storage.set(SESSION_STORAGE_KEY, &raw)?;
        *self.current.write() = Some(session);
        Ok(())
    }

    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.storage.remove(SESSION_STORAGE_KEY)?;
        self.current.write().take();
        Ok(())
    }
}
