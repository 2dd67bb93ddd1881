//! Single-slot persistence of the last obtained [`Credential`].

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::{Credential, StoreError};

const CREDENTIAL_KEY: &str = "credential";

/// Owner read/write only: the stored value carries bearer tokens.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Byte-oriented key-value medium the credential is persisted in.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned map is still a valid map.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Stores each key as `<dir>/<key>.json`.
///
/// On Unix the directory is created `0700` and files are written `0600`.
/// Writes go to a temporary file that is renamed over the target, so a
/// reader sees either the old value or the new one.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        fs::set_permissions(&self.dir, fs::Permissions::from_mode(DIR_MODE))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_dir()?;

        let path = self.path(key);
        let temp_path = path.with_extension("json.tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);
        let mut file = options.open(&temp_path)?;
        // A stale temp file keeps its old mode.
        #[cfg(unix)]
        file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
        file.write_all(&value)?;
        file.sync_all()?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Saves, loads and removes the credential under one fixed key. A new save
/// replaces whatever was stored before.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let bytes = credential.encode()?;
        self.backend.set(CREDENTIAL_KEY, bytes)
    }

    /// Returns `Ok(None)` when nothing is stored or the stored value no longer
    /// decodes.
    pub fn load(&self) -> Result<Option<Credential>, StoreError> {
        let Some(bytes) = self.backend.get(CREDENTIAL_KEY)? else {
            return Ok(None);
        };
        match Credential::decode(&bytes) {
            Ok(credential) => Ok(Some(credential)),
            Err(err) => {
                warn!(error = %err, "discarding undecodable stored credential");
                Ok(None)
            }
        }
    }

    pub fn remove(&self) -> Result<(), StoreError> {
        self.backend.remove(CREDENTIAL_KEY)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
