use thiserror::Error;

use crate::{
    reminder::{OwnerId, ReminderDueTime, ReminderId},
    scheduling::TimerError,
    storage::StorageError,
};

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Invalid reminder: {0}")]
    Validation(String),

    #[error("Cannot set a reminder in the past ({0})")]
    PastDue(ReminderDueTime),

    #[error("Reminder {id} not found")]
    NotFound { owner: OwnerId, id: ReminderId },

    #[error("Could not store reminders")]
    Persistence(#[from] StorageError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("Reminder service is shutting down")]
    CoordinatorStopped,
}

pub type ReminderResult<T> = Result<T, ReminderError>;
