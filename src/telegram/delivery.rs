use async_trait::async_trait;
use teloxide::prelude::*;
use thiserror::Error;

use crate::{
    reminder::OwnerId,
    scheduling::{ReminderDeliveryChannel, ReminderNotification},
};

#[derive(Debug, Error)]
pub enum TelegramDeliveryChannelError {
    #[error("Owner {0:?} is not a Telegram chat id")]
    InvalidOwner(OwnerId),

    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),
}

/// Sends notifications to the chat whose id is the reminder owner.
pub struct TelegramDeliveryChannel {
    bot: Bot,
}

impl TelegramDeliveryChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

pub fn owner_chat_id(owner: &OwnerId) -> Result<ChatId, TelegramDeliveryChannelError> {
    owner
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| TelegramDeliveryChannelError::InvalidOwner(owner.clone()))
}

#[async_trait]
impl ReminderDeliveryChannel for TelegramDeliveryChannel {
    async fn deliver(
        &self,
        owner: &OwnerId,
        notification: &ReminderNotification,
    ) -> anyhow::Result<()> {
        let chat_id = owner_chat_id(owner)?;

        self.bot
            .send_message(chat_id, notification.render())
            .await
            .map_err(TelegramDeliveryChannelError::from)?;

        Ok(())
    }
}
