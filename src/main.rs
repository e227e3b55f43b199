use std::sync::Arc;

use anyhow::Context;
use napomni::{
    appsettings::AppSettings,
    clock::SystemClock,
    scheduling::ReminderCoordinator,
    storage::JsonFileReminderStore,
    telegram::{ConfirmationSource, TelegramDeliveryChannel, TelegramFrontEnd},
};
use teloxide::Bot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = AppSettings::new().context("Could not load settings")?;
    log::info!(
        "Using reminders file {} in timezone {}",
        settings.storage.path.display(),
        settings.scheduler.timezone
    );

    let bot = Bot::new(&settings.telegram.token);
    let store = Arc::new(JsonFileReminderStore::new(settings.storage.path.clone()));
    let channel = Arc::new(TelegramDeliveryChannel::new(bot.clone()));
    let clock = Arc::new(SystemClock::new(settings.scheduler.timezone));

    let options = settings.scheduler.coordinator_options();
    let confirmations = ConfirmationSource::for_options(&options);
    let (coordinator, report) = ReminderCoordinator::start(store, channel, clock, options).await;
    if report.overdue > 0 {
        log::warn!("{} reminders were overdue and fire now", report.overdue);
    }

    TelegramFrontEnd::run(bot, coordinator.clone(), confirmations).await;

    coordinator
        .shutdown()
        .await
        .context("Could not save reminders on shutdown")?;
    log::info!("Shut down cleanly");

    Ok(())
}
