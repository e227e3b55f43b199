use crate::{clock::Clock, storage::ReminderMap};

use super::manager::{CoordinatorState, ReminderSlot, SlotState};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub owners: usize,
    pub reminders: usize,
    /// Reminders whose due time passed while the process was down. They fire right away.
    pub overdue: usize,
}

/// Re-arms a timer for every persisted reminder. Runs once, before any request is handled.
pub(super) fn restore(state: &mut CoordinatorState, persisted: ReminderMap) -> RecoveryReport {
    let now = state.clock.now_utc();
    let mut report = RecoveryReport::default();

    for (owner, reminders) in persisted {
        let max_id = reminders.iter().map(|r| r.id).max().unwrap_or(0);
        let last_id = state.last_ids.entry(owner.clone()).or_insert(0);
        *last_id = (*last_id).max(max_id);

        let mut slots = Vec::with_capacity(reminders.len());
        for reminder in reminders {
            if state.clock.resolve_lenient(reminder.due_at.datetime()) <= now {
                report.overdue += 1;
            }

            match state.arm(&reminder) {
                Ok(handle) => slots.push(ReminderSlot {
                    reminder,
                    state: SlotState::Pending(handle),
                }),
                Err(e) => log::error!("Could not restore reminder. error = {}", e),
            }
        }

        if !slots.is_empty() {
            report.owners += 1;
            report.reminders += slots.len();
            state.reminders.insert(owner, slots);
        }
    }

    log::info!(
        "Restored {} reminders for {} owners, {} overdue",
        report.reminders,
        report.owners,
        report.overdue
    );

    report
}
