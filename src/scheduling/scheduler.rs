use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    future::Future,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    reminder::{OwnerId, ReminderDueTime, ReminderId},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub owner: OwnerId,
    pub id: ReminderId,
}

impl ReminderKey {
    pub fn new(owner: impl Into<OwnerId>, id: ReminderId) -> Self {
        Self {
            owner: owner.into(),
            id,
        }
    }
}

impl fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.id)
    }
}

/// Identifies one arming of a timer. A re-armed key gets a new generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerHandle {
    pub key: ReminderKey,
    pub generation: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("Timer for reminder {0} is already armed")]
    AlreadyArmed(ReminderKey),
}

struct ScheduledTimer {
    generation: u64,
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl ScheduledTimer {
    fn cancel(self) {
        self.cancellation_token.cancel();
        drop(self.task_handle);
    }
}

pub struct TimerEngine {
    clock: Arc<dyn Clock>,
    timers: HashMap<ReminderKey, ScheduledTimer>,
    next_generation: u64,
}

impl TimerEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Runs the future built by `payload` once, no earlier than `due_at`.
    /// Past due times fire immediately.
    pub fn arm<F, Fut>(
        &mut self,
        key: ReminderKey,
        due_at: &ReminderDueTime,
        payload: F,
    ) -> Result<TimerHandle, TimerError>
    where
        F: FnOnce(TimerHandle) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let entry = match self.timers.entry(key.clone()) {
            Entry::Occupied(_) => return Err(TimerError::AlreadyArmed(key)),
            Entry::Vacant(entry) => entry,
        };

        let generation = self.next_generation;
        self.next_generation += 1;

        let delay = delay_until(
            self.clock.resolve_lenient(due_at.datetime()),
            self.clock.now_utc(),
        );
        let cancellation_token = CancellationToken::new();
        let task_cancellation_token = cancellation_token.child_token();

        log::info!(
            "[ARM] Sleeping for {:?} delay. Reminder {} generation {}",
            delay,
            key,
            generation
        );

        let handle = TimerHandle {
            key: key.clone(),
            generation,
        };
        let payload = payload(handle.clone());
        let task_key = key;
        let task_handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_cancellation_token.cancelled() => {
                    log::debug!("Timer for reminder {} was cancelled", task_key);
                },
                _ = tokio::time::sleep(delay) => {
                    log::debug!("Timer for reminder {} fired", task_key);
                    payload.await;
                }
            }
        });

        entry.insert(ScheduledTimer {
            generation,
            task_handle,
            cancellation_token,
        });

        Ok(handle)
    }

    /// Best-effort cancellation. Returns false when the handle is stale or already fired.
    pub fn cancel(&mut self, handle: &TimerHandle) -> bool {
        match self.take_matching(handle) {
            Some(timer) => {
                log::info!("[CANCEL] Reminder {}", handle.key);
                timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the table entry of a timer that has fired.
    pub fn complete(&mut self, handle: &TimerHandle) -> bool {
        self.take_matching(handle).is_some()
    }

    #[cfg(test)]
    pub fn is_current(&self, handle: &TimerHandle) -> bool {
        self.timers
            .get(&handle.key)
            .is_some_and(|timer| timer.generation == handle.generation)
    }

    #[cfg(test)]
    pub fn is_armed(&self, key: &ReminderKey) -> bool {
        self.timers.contains_key(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn shutdown(&mut self) {
        let count = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.cancel();
        }

        if count > 0 {
            log::info!("Cancelled {} pending timers", count);
        }
    }

    fn take_matching(&mut self, handle: &TimerHandle) -> Option<ScheduledTimer> {
        match self.timers.entry(handle.key.clone()) {
            Entry::Occupied(entry) if entry.get().generation == handle.generation => {
                Some(entry.remove())
            }
            _ => None,
        }
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sleep duration until `due_at`, zero when it has already passed.
pub fn delay_until(due_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (due_at - now).to_std().unwrap_or(Duration::ZERO)
}
