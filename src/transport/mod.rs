pub mod recording;
pub mod telegram;
pub mod updates;

pub use recording::{RecordingTransport, SentAction};
pub use telegram::TelegramClient;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// Serializes directly as a Bot API `reply_markup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn single(text: &str, callback_data: &str) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineButton {
                text: text.to_string(),
                callback_data: callback_data.to_string(),
            }]],
        }
    }
}

/// Outbound chat actions.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError>;
}
