use std::path::PathBuf;

use config::{
    Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState,
};
use serde::Deserialize;

use crate::scheduling::CoordinatorOptions;

#[derive(Deserialize, Debug)]
pub struct TelegramSettings {
    pub token: String,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct StorageSettings {
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("reminders.json"),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct SchedulerSettings {
    pub timezone: chrono_tz::Tz,
    pub send_confirmations: bool,
    pub mailbox_size: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let options = CoordinatorOptions::default();
        Self {
            timezone: chrono_tz::UTC,
            send_confirmations: options.send_confirmations,
            mailbox_size: options.mailbox_size,
        }
    }
}

impl SchedulerSettings {
    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            send_confirmations: self.send_confirmations,
            mailbox_size: self.mailbox_size,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct AppSettings {
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

impl AppSettings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(
            Config::builder()
                .add_source(File::with_name("appsettings").required(false))
                .add_source(File::with_name("appsettings.local").required(false))
                .add_source(Environment::with_prefix("APP").separator("__")),
        )
    }

    fn from_config(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}
