use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Mutex as StdMutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    ReminderMap, StorageError,
    model::{StoredReminderMap, from_stored_map, to_stored_map},
};

#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Reads the whole mapping. Missing or corrupt data yields an empty mapping.
    async fn load(&self) -> ReminderMap;

    /// Replaces the persisted mapping. Readers observe either the old or the new state.
    async fn save(&self, reminders: &ReminderMap) -> Result<(), StorageError>;
}

pub struct JsonFileReminderStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileReminderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }

    async fn read(&self) -> Result<Option<StoredReminderMap>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl ReminderStore for JsonFileReminderStore {
    async fn load(&self) -> ReminderMap {
        match self.read().await {
            Ok(Some(stored)) => {
                let reminders = from_stored_map(stored);
                log::info!(
                    "Loaded reminders for {} owners from {}",
                    reminders.len(),
                    self.path.display()
                );
                reminders
            }
            Ok(None) => {
                log::info!(
                    "No reminder store at {}, starting empty",
                    self.path.display()
                );
                ReminderMap::new()
            }
            Err(e) => {
                log::warn!(
                    "Could not read reminder store at {}, starting empty. error = {}",
                    self.path.display(),
                    e
                );
                ReminderMap::new()
            }
        }
    }

    async fn save(&self, reminders: &ReminderMap) -> Result<(), StorageError> {
        let contents = serde_json::to_vec_pretty(&to_stored_map(reminders))?;
        let temp_path = self.temp_path();

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        log::debug!("Saved reminders to {}", self.path.display());
        Ok(())
    }
}

/// Process-local store. Keeps the serialized form so reloads behave like the file store.
#[derive(Default)]
pub struct InMemoryReminderStore {
    stored: StdMutex<Option<StoredReminderMap>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_reminders(reminders: &ReminderMap) -> Self {
        let store = Self::new();
        *store.lock_stored() = Some(to_stored_map(reminders));
        store
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ReminderMap {
        self.lock_stored()
            .clone()
            .map(from_stored_map)
            .unwrap_or_default()
    }

    fn lock_stored(&self) -> std::sync::MutexGuard<'_, Option<StoredReminderMap>> {
        self.stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn load(&self) -> ReminderMap {
        self.snapshot()
    }

    async fn save(&self, reminders: &ReminderMap) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("saves are disabled")));
        }

        *self.lock_stored() = Some(to_stored_map(reminders));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
