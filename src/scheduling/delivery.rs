use async_trait::async_trait;

use crate::reminder::{OwnerId, Reminder};

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ReminderMessageType {
    Scheduled,
    Updated,
    Fired,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ReminderNotification {
    pub kind: ReminderMessageType,
    pub reminder: Reminder,
}

impl ReminderNotification {
    pub fn new(kind: ReminderMessageType, reminder: Reminder) -> Self {
        Self { kind, reminder }
    }

    pub fn render(&self) -> String {
        let reminder = &self.reminder;
        match self.kind {
            ReminderMessageType::Fired => match reminder.category.emoji() {
                Some(emoji) => format!("⏰ Reminder: {} {}", emoji, reminder.text),
                None => format!("⏰ Reminder: {}", reminder.text),
            },
            ReminderMessageType::Scheduled => {
                format!("✅ Reminder {} set for {}", reminder.id, reminder.due_at)
            }
            ReminderMessageType::Updated => {
                format!("✅ Reminder {} moved to {}", reminder.id, reminder.due_at)
            }
            ReminderMessageType::Cancelled => format!("❌ Cancelled: {}", reminder.text),
        }
    }
}

/// Outbound notification sink. Failures are logged by the caller and never retried.
#[async_trait]
pub trait ReminderDeliveryChannel: Send + Sync + 'static {
    async fn deliver(
        &self,
        owner: &OwnerId,
        notification: &ReminderNotification,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::reminder::{ReminderCategory, ReminderDueTime};

    use super::*;

    fn reminder(category: ReminderCategory) -> Reminder {
        Reminder {
            id: 1,
            owner: "42".to_string(),
            due_at: ReminderDueTime::new(
                NaiveDate::from_ymd_opt(2030, 4, 1)
                    .unwrap()
                    .and_hms_opt(7, 30, 0)
                    .unwrap(),
            ),
            text: "call mom".to_string(),
            category,
        }
    }

    #[test]
    fn fired_plain_reminder_shows_text() {
        let notification =
            ReminderNotification::new(ReminderMessageType::Fired, reminder(ReminderCategory::Plain));

        assert_eq!(notification.render(), "⏰ Reminder: call mom");
    }

    #[test]
    fn fired_categorized_reminder_shows_emoji() {
        let notification = ReminderNotification::new(
            ReminderMessageType::Fired,
            reminder(ReminderCategory::Birthday),
        );

        assert_eq!(notification.render(), "⏰ Reminder: 🎂 call mom");
    }

    #[test]
    fn confirmation_shows_due_time() {
        let notification = ReminderNotification::new(
            ReminderMessageType::Scheduled,
            reminder(ReminderCategory::Plain),
        );

        assert_eq!(notification.render(), "✅ Reminder 1 set for 01.04.2030 07:30");
    }
}
