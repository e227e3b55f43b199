use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

pub type ReminderId = u64;

/// Textual identifier of the user a reminder is delivered to.
pub type OwnerId = String;

const DUE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";
const DUE_TIME_FORMAT_WITH_SECONDS: &str = "%d.%m.%Y %H:%M:%S";

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderCategory {
    #[default]
    Plain,
    Birthday,
    Meeting,
    Holiday,
    Task,
}

impl ReminderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderCategory::Plain => "plain",
            ReminderCategory::Birthday => "birthday",
            ReminderCategory::Meeting => "meeting",
            ReminderCategory::Holiday => "holiday",
            ReminderCategory::Task => "task",
        }
    }

    pub fn emoji(&self) -> Option<&'static str> {
        match self {
            ReminderCategory::Plain => None,
            ReminderCategory::Birthday => Some("🎂"),
            ReminderCategory::Meeting => Some("📅"),
            ReminderCategory::Holiday => Some("🎉"),
            ReminderCategory::Task => Some("📝"),
        }
    }
}

impl FromStr for ReminderCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(ReminderCategory::Plain),
            "birthday" => Ok(ReminderCategory::Birthday),
            "meeting" => Ok(ReminderCategory::Meeting),
            "holiday" => Ok(ReminderCategory::Holiday),
            "task" => Ok(ReminderCategory::Task),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

impl fmt::Display for ReminderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown reminder category {0}")]
pub struct UnknownCategory(pub String);

/// Absolute due moment in the deployment's wall clock, normalized to whole seconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderDueTime(NaiveDateTime);

impl ReminderDueTime {
    pub fn new(inner: NaiveDateTime) -> Self {
        let normalized = inner.with_nanosecond(0).unwrap_or(inner);
        Self(normalized)
    }

    pub fn datetime(&self) -> &NaiveDateTime {
        &self.0
    }

    pub fn into_datetime(self) -> NaiveDateTime {
        self.0
    }

    /// Renders `DD.MM.YYYY HH:MM`, appending seconds only when they are set.
    pub fn to_display_string(&self) -> String {
        if self.0.second() == 0 {
            self.0.format(DUE_TIME_FORMAT).to_string()
        } else {
            self.0.format(DUE_TIME_FORMAT_WITH_SECONDS).to_string()
        }
    }

    pub fn parse(input: &str) -> Result<Self, chrono::ParseError> {
        let input = input.trim();
        NaiveDateTime::parse_from_str(input, DUE_TIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(input, DUE_TIME_FORMAT_WITH_SECONDS))
            .map(Self::new)
    }
}

impl From<NaiveDateTime> for ReminderDueTime {
    fn from(value: NaiveDateTime) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ReminderDueTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    pub owner: OwnerId,
    pub due_at: ReminderDueTime,
    pub text: String,
    pub category: ReminderCategory,
}
