//! A [`PersistedSecretStore`] kept in a single CBOR file.
//!
//! Every mutation rewrites the whole map to a temporary file in the same
//! directory and renames it over the store file, so a batch is either fully
//! applied or not at all. Writers are serialized within the process by a
//! mutex and across processes by a [`FileLock`] next to the store file.
//! Readers never take the lock: the rename is atomic.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use keyring_core::storage::{PersistedSecretStore, StorageError, StorageResult};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::lock::FileLock;

const STORE_FILE_VERSION: u32 = 1;
const LOCK_EXTENSION: &str = "lock";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: BTreeMap<String, Vec<u8>>,
}

/// File-backed secret store.
#[derive(Debug)]
pub struct FileSecretStore {
    inner: Arc<Inner>,
    writer: Mutex<()>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    lock: FileLock,
}

impl FileSecretStore {
    /// Opens the store at `path`, creating parent directories and the lock
    /// file. The store file itself is created on first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = FileLock::open(&lock_path(&path))?;
        Ok(Self {
            inner: Arc::new(Inner { path, lock }),
            writer: Mutex::new(()),
        })
    }

    /// Path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    async fn read<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(BTreeMap<String, Vec<u8>>) -> T + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || load(&inner.path).map(f))
            .await
            .map_err(|err| StorageError::Backend(err.to_string()))?
    }

    /// Applies `mutate` to the current map and persists the result.
    async fn update<F>(&self, mutate: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, Vec<u8>>) + Send + 'static,
    {
        let _writer = self.writer.lock().await;
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let _guard = inner.lock.lock()?;
            let mut entries = load(&inner.path)?;
            mutate(&mut entries);
            persist(&inner.path, entries)
        })
        .await
        .map_err(|err| StorageError::Backend(err.to_string()))?
    }
}

#[async_trait]
impl PersistedSecretStore for FileSecretStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let key = key.to_string();
        self.read(move |mut entries| entries.remove(&key)).await
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<BTreeMap<String, Vec<u8>>> {
        let keys = keys.to_vec();
        self.read(move |mut entries| {
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|value| (key, value)))
                .collect()
        })
        .await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let prefix = prefix.to_string();
        self.read(move |entries| {
            entries
                .into_keys()
                .filter(|key| key.starts_with(&prefix))
                .collect()
        })
        .await
    }

    async fn set(&self, entries: BTreeMap<String, Vec<u8>>) -> StorageResult<()> {
        debug!("writing {} entries", entries.len());
        self.update(move |current| current.extend(entries)).await
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        let keys = keys.to_vec();
        self.update(move |current| {
            for key in &keys {
                current.remove(key);
            }
        })
        .await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.update(BTreeMap::clear).await
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(LOCK_EXTENSION);
    path.with_file_name(name)
}

fn load(path: &Path) -> StorageResult<BTreeMap<String, Vec<u8>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(err.into()),
    };
    let contents: StoreFile = ciborium::de::from_reader(BufReader::new(file))
        .map_err(|err| StorageError::Serialization(err.to_string()))?;
    if contents.version != STORE_FILE_VERSION {
        return Err(StorageError::UnsupportedEnvelopeVersion(contents.version));
    }
    Ok(contents.entries)
}

fn persist(path: &Path, entries: BTreeMap<String, Vec<u8>>) -> StorageResult<()> {
    let contents = StoreFile {
        version: STORE_FILE_VERSION,
        entries,
    };
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&contents, &mut bytes)
        .map_err(|err| StorageError::Serialization(err.to_string()))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
    let written = write_synced(&tmp, &bytes).and_then(|()| fs::rename(&tmp, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
