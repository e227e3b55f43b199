use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::reminder::{OwnerId, Reminder, ReminderCategory, ReminderDueTime, ReminderId};

use super::{ReminderMap, StorageError};

/// On-disk shape of a single reminder: `{id, time, text, type}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReminder {
    pub id: ReminderId,
    pub time: String,
    pub text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

pub type StoredReminderMap = BTreeMap<String, Vec<StoredReminder>>;

impl From<&Reminder> for StoredReminder {
    fn from(value: &Reminder) -> Self {
        Self {
            id: value.id,
            time: value.due_at.to_display_string(),
            text: value.text.clone(),
            kind: Some(value.category.as_str().to_string()),
        }
    }
}

impl StoredReminder {
    pub fn into_reminder(self, owner: &OwnerId) -> Result<Reminder, StorageError> {
        let due_at = ReminderDueTime::parse(&self.time).map_err(|e| {
            StorageError::InvalidRecord(format!(
                "reminder {} of {} has unparsable time {:?}: {}",
                self.id, owner, self.time, e
            ))
        })?;

        Ok(Reminder {
            id: self.id,
            owner: owner.clone(),
            due_at,
            text: self.text,
            category: parse_category(self.kind.as_deref()),
        })
    }
}

fn parse_category(kind: Option<&str>) -> ReminderCategory {
    match kind {
        None => ReminderCategory::Plain,
        Some(kind) => kind.parse().unwrap_or_else(|_| {
            log::warn!("Unknown reminder category {}, defaulting to plain", kind);
            ReminderCategory::Plain
        }),
    }
}

pub fn to_stored_map(reminders: &ReminderMap) -> StoredReminderMap {
    reminders
        .iter()
        .filter(|(_, owner_reminders)| !owner_reminders.is_empty())
        .map(|(owner, owner_reminders)| {
            (
                owner.clone(),
                owner_reminders.iter().map(StoredReminder::from).collect(),
            )
        })
        .collect()
}

/// Converts the on-disk map, dropping unreadable records and renumbering duplicate ids.
pub fn from_stored_map(stored: StoredReminderMap) -> ReminderMap {
    let mut reminders = ReminderMap::new();

    for (owner, records) in stored {
        let mut owner_reminders = Vec::with_capacity(records.len());
        for record in records {
            match record.into_reminder(&owner) {
                Ok(reminder) => owner_reminders.push(reminder),
                Err(e) => log::warn!("Dropping stored reminder. {}", e),
            }
        }

        renumber_duplicates(&owner, &mut owner_reminders);

        if !owner_reminders.is_empty() {
            reminders.insert(owner, owner_reminders);
        }
    }

    reminders
}

/// Moves every repeated id to a free one, preferring ids above the current maximum.
fn renumber_duplicates(owner: &OwnerId, reminders: &mut [Reminder]) {
    let mut taken: HashSet<ReminderId> = reminders.iter().map(|r| r.id).collect();
    let max_id = taken.iter().copied().max().unwrap_or(0);
    let mut candidate = max_id.checked_add(1).unwrap_or(1);
    let mut seen = HashSet::new();

    for reminder in reminders.iter_mut() {
        if seen.insert(reminder.id) {
            continue;
        }

        // There are fewer records than ids, so a free one always exists.
        while taken.contains(&candidate) {
            candidate = candidate.checked_add(1).unwrap_or(1);
        }

        log::warn!(
            "Duplicate reminder id in store, renumbering. [owner = {}, id = {}, new_id = {}]",
            owner,
            reminder.id,
            candidate
        );
        reminder.id = candidate;
        taken.insert(candidate);
        seen.insert(candidate);
    }
}
