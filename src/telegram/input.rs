use thiserror::Error;

use crate::{
    reminder::{Reminder, ReminderCategory, ReminderDueTime, ReminderId},
    scheduling::{EditReminder, NewReminder},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Wrong format. Expected: {0}")]
    Format(&'static str),

    #[error("Could not parse date and time {0:?}. Use DD.MM.YYYY HH:MM")]
    DueTime(String),

    #[error("Reminder id must be a number, got {0:?}")]
    Id(String),

    #[error("Reminder text must not be empty")]
    EmptyText,
}

pub const NEW_REMINDER_FORMAT: &str = "DD.MM.YYYY HH:MM Text";
pub const EDIT_REMINDER_FORMAT: &str = "ID DD.MM.YYYY HH:MM New text";

/// Parses `DD.MM.YYYY HH:MM [#category] text`.
pub fn parse_new_reminder(input: &str) -> Result<NewReminder, InputError> {
    let (due_at, rest) = split_due_time(input.trim(), NEW_REMINDER_FORMAT)?;
    let (category, text) = split_category(rest);
    let text = non_empty(text)?;

    Ok(NewReminder::new(due_at, text).with_category(category.unwrap_or_default()))
}

pub fn parse_reminder_id(input: &str) -> Result<ReminderId, InputError> {
    let input = input.trim();
    input
        .parse()
        .map_err(|_| InputError::Id(input.to_string()))
}

/// Parses `ID DD.MM.YYYY HH:MM [#category] text`.
pub fn parse_edit_reminder(input: &str) -> Result<(ReminderId, EditReminder), InputError> {
    let (id, rest) = input
        .trim()
        .split_once(char::is_whitespace)
        .ok_or(InputError::Format(EDIT_REMINDER_FORMAT))?;
    let id = parse_reminder_id(id)?;

    let (due_at, rest) = split_due_time(rest.trim_start(), EDIT_REMINDER_FORMAT)?;
    let (category, text) = split_category(rest);
    let text = non_empty(text)?;

    let mut edit = EditReminder::new(due_at, text);
    if let Some(category) = category {
        edit = edit.with_category(category);
    }

    Ok((id, edit))
}

pub fn format_reminder_list(reminders: &[Reminder]) -> String {
    if reminders.is_empty() {
        return "You have no active reminders".to_string();
    }

    let lines: Vec<String> = reminders.iter().map(format_reminder_line).collect();
    format!("Your reminders:\n{}", lines.join("\n"))
}

fn format_reminder_line(reminder: &Reminder) -> String {
    match reminder.category.emoji() {
        Some(emoji) => format!(
            "{}. {} - {} {}",
            reminder.id, reminder.due_at, emoji, reminder.text
        ),
        None => format!("{}. {} - {}", reminder.id, reminder.due_at, reminder.text),
    }
}

fn split_due_time<'a>(
    input: &'a str,
    expected: &'static str,
) -> Result<(ReminderDueTime, &'a str), InputError> {
    let mut parts = input.splitn(3, char::is_whitespace);
    let (Some(date), Some(time)) = (parts.next(), parts.next()) else {
        return Err(InputError::Format(expected));
    };
    let rest = parts.next().unwrap_or_default();

    let raw = format!("{date} {time}");
    let due_at = ReminderDueTime::parse(&raw).map_err(|_| InputError::DueTime(raw))?;

    Ok((due_at, rest))
}

fn split_category(text: &str) -> (Option<ReminderCategory>, &str) {
    let text = text.trim();
    let Some(tagged) = text.strip_prefix('#') else {
        return (None, text);
    };

    let (tag, rest) = tagged
        .split_once(char::is_whitespace)
        .unwrap_or((tagged, ""));
    match tag.parse() {
        Ok(category) => (Some(category), rest.trim()),
        Err(_) => (None, text),
    }
}

fn non_empty(text: &str) -> Result<&str, InputError> {
    if text.trim().is_empty() {
        Err(InputError::EmptyText)
    } else {
        Ok(text)
    }
}
