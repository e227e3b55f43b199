mod delivery;
mod input;

pub use delivery::{TelegramDeliveryChannel, TelegramDeliveryChannelError};
pub use input::InputError;

use std::fmt::Display;

use teloxide::dptree::case;
use teloxide::{
    dispatching::{UpdateHandler, dialogue, dialogue::InMemStorage},
    macros::BotCommands,
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup},
};

use crate::{
    error::ReminderError,
    reminder::{OwnerId, Reminder},
    scheduling::{
        CoordinatorOptions, ReminderCoordinator, ReminderMessageType, ReminderNotification,
    },
};

type GlobalDialogue = Dialogue<DialogueState, InMemStorage<DialogueState>>;
type HandlerResult = anyhow::Result<()>;

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub enum DialogueState {
    #[default]
    Idle,
    WaitingForNewReminder,
    WaitingForDeletion,
    WaitingForEdit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MenuAction {
    SetReminder,
    ListReminders,
    DeleteReminder,
    EditReminder,
}

impl MenuAction {
    const ALL: [MenuAction; 4] = [
        MenuAction::SetReminder,
        MenuAction::ListReminders,
        MenuAction::DeleteReminder,
        MenuAction::EditReminder,
    ];

    fn label(self) -> &'static str {
        match self {
            MenuAction::SetReminder => "Set reminder",
            MenuAction::ListReminders => "My reminders",
            MenuAction::DeleteReminder => "Delete reminder",
            MenuAction::EditReminder => "Edit reminder",
        }
    }

    fn from_text(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.label() == text.trim())
    }
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
enum GlobalCommand {
    Start,
    Cancel,
}

/// Who tells the user that a create, edit or delete went through. Exactly one of them does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationSource {
    /// The coordinator sends confirmations through the delivery channel.
    Coordinator,
    FrontEnd,
}

impl ConfirmationSource {
    pub fn for_options(options: &CoordinatorOptions) -> Self {
        if options.send_confirmations {
            ConfirmationSource::Coordinator
        } else {
            ConfirmationSource::FrontEnd
        }
    }

    fn reply(self, kind: ReminderMessageType, reminder: Reminder) -> Option<String> {
        match self {
            ConfirmationSource::Coordinator => None,
            ConfirmationSource::FrontEnd => Some(ReminderNotification::new(kind, reminder).render()),
        }
    }
}

pub struct TelegramFrontEnd;
impl TelegramFrontEnd {
    /// Runs the bot until Ctrl-C.
    pub async fn run(
        bot: Bot,
        coordinator: ReminderCoordinator,
        confirmations: ConfirmationSource,
    ) {
        log::info!("Starting Telegram front-end");

        let schema = dialogue::enter::<Update, InMemStorage<DialogueState>, DialogueState, _>()
            .branch(schema());

        Dispatcher::builder(bot, schema)
            .dependencies(dptree::deps![
                InMemStorage::<DialogueState>::new(),
                coordinator,
                confirmations
            ])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        log::info!("Telegram front-end stopped");
    }
}

fn schema() -> UpdateHandler<anyhow::Error> {
    let command_handler = teloxide::filter_command::<GlobalCommand, _>()
        .branch(case![GlobalCommand::Start].endpoint(start))
        .branch(case![GlobalCommand::Cancel].endpoint(cancel));

    let menu_handler = dptree::filter_map(|msg: Message| msg.text().and_then(MenuAction::from_text))
        .branch(case![MenuAction::SetReminder].endpoint(ask_new_reminder))
        .branch(case![MenuAction::ListReminders].endpoint(list_reminders))
        .branch(case![MenuAction::DeleteReminder].endpoint(ask_deletion))
        .branch(case![MenuAction::EditReminder].endpoint(ask_edit));

    Update::filter_message()
        .branch(command_handler)
        .branch(menu_handler)
        .branch(case![DialogueState::WaitingForNewReminder].endpoint(receive_new_reminder))
        .branch(case![DialogueState::WaitingForDeletion].endpoint(receive_deletion))
        .branch(case![DialogueState::WaitingForEdit].endpoint(receive_edit))
        .branch(dptree::endpoint(invalid_state))
}

fn main_menu() -> KeyboardMarkup {
    let row = |actions: [MenuAction; 2]| {
        actions
            .into_iter()
            .map(|action| KeyboardButton::new(action.label()))
            .collect::<Vec<_>>()
    };

    KeyboardMarkup::new(vec![
        row([MenuAction::SetReminder, MenuAction::ListReminders]),
        row([MenuAction::DeleteReminder, MenuAction::EditReminder]),
    ])
    .resize_keyboard()
}

fn owner_of(msg: &Message) -> OwnerId {
    msg.chat.id.0.to_string()
}

async fn start(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Hi! I will remind you about anything at the time you choose. Pick an action below.",
    )
    .reply_markup(main_menu())
    .await?;
    dialogue.exit().await?;
    Ok(())
}

async fn cancel(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "Cancelled current operation.")
        .reply_markup(main_menu())
        .await?;
    dialogue.exit().await?;
    Ok(())
}

async fn ask_new_reminder(bot: Bot, dialogue: GlobalDialogue, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        format!(
            "Send the reminder as: {}\nAdd #birthday, #meeting, #holiday or #task before the text to tag it.",
            input::NEW_REMINDER_FORMAT
        ),
    )
    .await?;
    dialogue.update(DialogueState::WaitingForNewReminder).await?;
    Ok(())
}

async fn list_reminders(
    bot: Bot,
    dialogue: GlobalDialogue,
    coordinator: ReminderCoordinator,
    msg: Message,
) -> HandlerResult {
    dialogue.exit().await?;

    match coordinator.list(owner_of(&msg)).await {
        Ok(reminders) => {
            bot.send_message(msg.chat.id, input::format_reminder_list(&reminders))
                .reply_markup(main_menu())
                .await?;
        }
        Err(e) => reply_error(&bot, &msg, e).await?,
    }

    Ok(())
}

async fn ask_deletion(
    bot: Bot,
    dialogue: GlobalDialogue,
    coordinator: ReminderCoordinator,
    msg: Message,
) -> HandlerResult {
    ask_for_reminder(bot, dialogue, coordinator, msg, DialogueState::WaitingForDeletion).await
}

async fn ask_edit(
    bot: Bot,
    dialogue: GlobalDialogue,
    coordinator: ReminderCoordinator,
    msg: Message,
) -> HandlerResult {
    ask_for_reminder(bot, dialogue, coordinator, msg, DialogueState::WaitingForEdit).await
}

/// Shows the current reminders and waits for the user to pick one.
async fn ask_for_reminder(
    bot: Bot,
    dialogue: GlobalDialogue,
    coordinator: ReminderCoordinator,
    msg: Message,
    next: DialogueState,
) -> HandlerResult {
    let reminders = match coordinator.list(owner_of(&msg)).await {
        Ok(reminders) => reminders,
        Err(e) => return reply_error(&bot, &msg, e).await,
    };

    if reminders.is_empty() {
        bot.send_message(msg.chat.id, input::format_reminder_list(&reminders))
            .reply_markup(main_menu())
            .await?;
        dialogue.exit().await?;
        return Ok(());
    }

    let prompt = match next {
        DialogueState::WaitingForEdit => format!("Send: {}", input::EDIT_REMINDER_FORMAT),
        _ => "Send the ID of the reminder to delete.".to_string(),
    };
    bot.send_message(
        msg.chat.id,
        format!("{}\n\n{}", input::format_reminder_list(&reminders), prompt),
    )
    .await?;
    dialogue.update(next).await?;

    Ok(())
}

async fn receive_new_reminder(
    bot: Bot,
    dialogue: GlobalDialogue,
    coordinator: ReminderCoordinator,
    confirmations: ConfirmationSource,
    msg: Message,
) -> HandlerResult {
    let request = match input::parse_new_reminder(msg.text().unwrap_or_default()) {
        Ok(request) => request,
        Err(e) => return reply_error(&bot, &msg, e).await,
    };

    match coordinator.create(owner_of(&msg), request).await {
        Ok(reminder) => {
            log::debug!("Created reminder {} for chat {}", reminder.id, msg.chat.id);
            let reply = confirmations.reply(ReminderMessageType::Scheduled, reminder);
            finish(&bot, &dialogue, &msg, reply).await?;
        }
        Err(e) => handle_coordinator_error(&bot, &dialogue, &msg, e).await?,
    }

    Ok(())
}

async fn receive_deletion(
    bot: Bot,
    dialogue: GlobalDialogue,
    coordinator: ReminderCoordinator,
    confirmations: ConfirmationSource,
    msg: Message,
) -> HandlerResult {
    let id = match input::parse_reminder_id(msg.text().unwrap_or_default()) {
        Ok(id) => id,
        Err(e) => return reply_error(&bot, &msg, e).await,
    };

    match coordinator.delete(owner_of(&msg), id).await {
        Ok(reminder) => {
            let reply = confirmations.reply(ReminderMessageType::Cancelled, reminder);
            finish(&bot, &dialogue, &msg, reply).await?;
        }
        Err(e) => handle_coordinator_error(&bot, &dialogue, &msg, e).await?,
    }

    Ok(())
}

async fn receive_edit(
    bot: Bot,
    dialogue: GlobalDialogue,
    coordinator: ReminderCoordinator,
    confirmations: ConfirmationSource,
    msg: Message,
) -> HandlerResult {
    let (id, request) = match input::parse_edit_reminder(msg.text().unwrap_or_default()) {
        Ok(parsed) => parsed,
        Err(e) => return reply_error(&bot, &msg, e).await,
    };

    match coordinator.edit(owner_of(&msg), id, request).await {
        Ok(reminder) => {
            let reply = confirmations.reply(ReminderMessageType::Updated, reminder);
            finish(&bot, &dialogue, &msg, reply).await?;
        }
        Err(e) => handle_coordinator_error(&bot, &dialogue, &msg, e).await?,
    }

    Ok(())
}

/// Ends a successful request. Silent when the coordinator confirms on its own.
async fn finish(
    bot: &Bot,
    dialogue: &GlobalDialogue,
    msg: &Message,
    reply: Option<String>,
) -> HandlerResult {
    if let Some(reply) = reply {
        bot.send_message(msg.chat.id, reply)
            .reply_markup(main_menu())
            .await?;
    }
    dialogue.exit().await?;
    Ok(())
}

async fn invalid_state(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Pick an action from the menu or use /cancel.",
    )
    .reply_markup(main_menu())
    .await?;
    Ok(())
}

/// Keeps the dialogue waiting so the user can retry, unless the service is gone.
async fn handle_coordinator_error(
    bot: &Bot,
    dialogue: &GlobalDialogue,
    msg: &Message,
    error: ReminderError,
) -> HandlerResult {
    if matches!(error, ReminderError::CoordinatorStopped) {
        dialogue.exit().await?;
    }
    reply_error(bot, msg, error).await
}

async fn reply_error(bot: &Bot, msg: &Message, error: impl Display) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        format!("{}\nTry again or use /cancel.", error),
    )
    .await?;
    Ok(())
}
