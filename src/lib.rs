pub mod appsettings;
pub mod clock;
pub mod error;
pub mod reminder;
pub mod scheduling;
pub mod storage;
pub mod telegram;

pub use error::{ReminderError, ReminderResult};
pub use reminder::{OwnerId, Reminder, ReminderCategory, ReminderDueTime, ReminderId};
