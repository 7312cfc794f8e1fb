use crate::config::MessagesConfig;
use crate::error::StoreError;
use crate::events::ChatRef;
use crate::status::Status;
use crate::store::{Profile, StatusStore, UserRecord};
use crate::transport::{ChatTransport, InlineKeyboard};
use std::sync::Arc;

pub const ACCESS_CALLBACK: &str = "get_access";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Started(UserRecord),
    StatusReported(Status),
    AccessInfoSent,
    Unknown(String),
}

/// Private-chat commands and the access button.
pub struct CommandHandler {
    store: Arc<StatusStore>,
    transport: Arc<dyn ChatTransport>,
    messages: MessagesConfig,
    keyboard: InlineKeyboard,
}

impl CommandHandler {
    pub fn new(
        store: Arc<StatusStore>,
        transport: Arc<dyn ChatTransport>,
        messages: MessagesConfig,
    ) -> Self {
        let keyboard = InlineKeyboard::single(&messages.access_button, ACCESS_CALLBACK);
        Self {
            store,
            transport,
            messages,
            keyboard,
        }
    }

    pub fn keyboard(&self) -> &InlineKeyboard {
        &self.keyboard
    }

    pub async fn handle_command(
        &self,
        from: &Profile,
        chat: &ChatRef,
        name: &str,
    ) -> Result<CommandOutcome, StoreError> {
        match name {
            "start" => {
                let record = self.store.upsert(from).await?;
                self.send(&chat.id, &self.messages.welcome, Some(&self.keyboard))
                    .await;
                self.send_onboarding(&chat.id).await;
                Ok(CommandOutcome::Started(record))
            }
            "status" => {
                self.store.upsert(from).await?;
                let status = self.store.get_status(&from.chat_id).await?;
                let label = self.store.taxonomy().display(&status);
                let reply = self.messages.status_reply(&label);
                self.send(&chat.id, &reply, None).await;
                Ok(CommandOutcome::StatusReported(status))
            }
            other => {
                log::debug!("Ignoring unknown command /{other} from {}", from.chat_id);
                Ok(CommandOutcome::Unknown(other.to_string()))
            }
        }
    }

    pub async fn handle_callback(
        &self,
        id: &str,
        from: &Profile,
        chat: Option<&ChatRef>,
        data: Option<&str>,
    ) -> Result<CommandOutcome, StoreError> {
        if let Err(e) = self.transport.answer_callback(id).await {
            log::debug!("Failed to answer callback {id}: {e}");
        }

        match data {
            Some(ACCESS_CALLBACK) => {
                self.store.upsert(from).await?;
                let target = chat.map(|c| c.id.as_str()).unwrap_or(&from.chat_id);
                self.send_onboarding(target).await;
                Ok(CommandOutcome::AccessInfoSent)
            }
            other => {
                let data = other.unwrap_or_default();
                log::debug!("Ignoring callback '{data}' from {}", from.chat_id);
                Ok(CommandOutcome::Unknown(data.to_string()))
            }
        }
    }

    async fn send_onboarding(&self, chat_id: &str) {
        for line in &self.messages.onboarding {
            self.send(chat_id, line, None).await;
        }
    }

    async fn send(&self, chat_id: &str, text: &str, keyboard: Option<&InlineKeyboard>) {
        if let Err(e) = self.transport.send_message(chat_id, text, keyboard).await {
            log::warn!("Failed to send message to {chat_id}: {e}");
        }
    }
}
