use tokio::sync::{mpsc, oneshot};

use crate::{
    error::{ReminderError, ReminderResult},
    reminder::{OwnerId, Reminder, ReminderCategory, ReminderDueTime, ReminderId},
};

use super::scheduler::TimerHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub due_at: ReminderDueTime,
    pub text: String,
    pub category: ReminderCategory,
}

impl NewReminder {
    pub fn new(due_at: impl Into<ReminderDueTime>, text: impl Into<String>) -> Self {
        Self {
            due_at: due_at.into(),
            text: text.into(),
            category: ReminderCategory::default(),
        }
    }

    pub fn with_category(mut self, category: ReminderCategory) -> Self {
        self.category = category;
        self
    }
}

/// Replacement schedule and text. A missing category keeps the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReminder {
    pub due_at: ReminderDueTime,
    pub text: String,
    pub category: Option<ReminderCategory>,
}

impl EditReminder {
    pub fn new(due_at: impl Into<ReminderDueTime>, text: impl Into<String>) -> Self {
        Self {
            due_at: due_at.into(),
            text: text.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: ReminderCategory) -> Self {
        self.category = Some(category);
        self
    }
}

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum CoordinatorMessage {
    Create {
        owner: OwnerId,
        request: NewReminder,
        reply: Reply<ReminderResult<Reminder>>,
    },
    Edit {
        owner: OwnerId,
        id: ReminderId,
        request: EditReminder,
        reply: Reply<ReminderResult<Reminder>>,
    },
    Delete {
        owner: OwnerId,
        id: ReminderId,
        reply: Reply<ReminderResult<Reminder>>,
    },
    List {
        owner: OwnerId,
        reply: Reply<Vec<Reminder>>,
    },
    Get {
        owner: OwnerId,
        id: ReminderId,
        reply: Reply<Option<Reminder>>,
    },
    Fire(TimerHandle),
    Delivered(TimerHandle),
    Shutdown {
        reply: Reply<ReminderResult<()>>,
    },
}

#[derive(Clone)]
pub struct CoordinatorSender(mpsc::Sender<CoordinatorMessage>);

impl CoordinatorSender {
    pub fn new(inner: mpsc::Sender<CoordinatorMessage>) -> Self {
        CoordinatorSender(inner)
    }

    /// Sends a request built around a fresh reply channel and waits for the answer.
    pub async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> CoordinatorMessage,
    ) -> ReminderResult<T> {
        let (reply, response) = oneshot::channel();
        self.0
            .send(build(reply))
            .await
            .map_err(|_| ReminderError::CoordinatorStopped)?;

        response.await.map_err(|_| ReminderError::CoordinatorStopped)
    }

    pub fn downgrade(&self) -> WeakCoordinatorSender {
        WeakCoordinatorSender(self.0.downgrade())
    }
}

/// Mailbox access for timers and deliveries. Does not keep the coordinator alive.
#[derive(Clone)]
pub struct WeakCoordinatorSender(mpsc::WeakSender<CoordinatorMessage>);

impl WeakCoordinatorSender {
    pub async fn notify_fired(&self, handle: TimerHandle) {
        self.notify(CoordinatorMessage::Fire(handle), "Timer fired").await;
    }

    pub async fn notify_delivered(&self, handle: TimerHandle) {
        self.notify(CoordinatorMessage::Delivered(handle), "Delivery finished")
            .await;
    }

    async fn notify(&self, message: CoordinatorMessage, event: &str) {
        let Some(sender) = self.0.upgrade() else {
            log::warn!("{} after the coordinator stopped", event);
            return;
        };
        if sender.send(message).await.is_err() {
            log::warn!("{} after the coordinator stopped", event);
        }
    }
}
