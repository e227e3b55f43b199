mod model;
mod reminder_storage;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::reminder::{OwnerId, Reminder};

pub use model::{StoredReminder, StoredReminderMap};
pub use reminder_storage::{InMemoryReminderStore, JsonFileReminderStore, ReminderStore};

/// Every owner's reminders, in insertion order per owner.
pub type ReminderMap = BTreeMap<OwnerId, Vec<Reminder>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored reminder: {0}")]
    InvalidRecord(String),
}
