mod common;
mod delivery;
mod manager;
mod recovery;
mod scheduler;

pub use common::{EditReminder, NewReminder};
pub use delivery::{ReminderDeliveryChannel, ReminderMessageType, ReminderNotification};
pub use manager::{CoordinatorOptions, ReminderCoordinator};
pub use recovery::RecoveryReport;
pub use scheduler::{ReminderKey, TimerEngine, TimerError, TimerHandle, delay_until};
