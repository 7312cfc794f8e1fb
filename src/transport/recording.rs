use super::{ChatTransport, InlineKeyboard};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentAction {
    Message {
        chat_id: String,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    Delete {
        chat_id: String,
        message_id: i64,
    },
    CallbackAnswer {
        callback_id: String,
    },
}

#[derive(Debug, Default)]
struct Faults {
    blocked_chats: HashSet<String>,
    gone_messages: HashSet<i64>,
    deletes_forbidden: bool,
}

/// Records every outbound action instead of sending it. Actions that fail are still
/// recorded, since the attempt is what callers need to observe.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    actions: Mutex<Vec<SentAction>>,
    faults: Mutex<Faults>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to this chat fail the way they do when a user blocked the bot.
    pub fn block_chat(&self, chat_id: &str) {
        lock(&self.faults).blocked_chats.insert(chat_id.to_string());
    }

    /// Deletes of this message fail as already deleted.
    pub fn mark_gone(&self, message_id: i64) {
        lock(&self.faults).gone_messages.insert(message_id);
    }

    /// Deletes fail as if the bot lacked the permission.
    pub fn forbid_deletes(&self) {
        lock(&self.faults).deletes_forbidden = true;
    }

    pub fn actions(&self) -> Vec<SentAction> {
        lock(&self.actions).clone()
    }

    pub fn clear(&self) {
        lock(&self.actions).clear();
    }

    pub fn deletes(&self) -> usize {
        lock(&self.actions)
            .iter()
            .filter(|action| matches!(action, SentAction::Delete { .. }))
            .count()
    }

    pub fn messages_to(&self, chat_id: &str) -> Vec<String> {
        lock(&self.actions)
            .iter()
            .filter_map(|action| match action {
                SentAction::Message { chat_id: to, text, .. } if to == chat_id => {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, action: SentAction) {
        lock(&self.actions).push(action);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TransportError> {
        self.record(SentAction::Message {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        if lock(&self.faults).blocked_chats.contains(chat_id) {
            return Err(TransportError::Api {
                code: 403,
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: i64) -> Result<(), TransportError> {
        self.record(SentAction::Delete {
            chat_id: chat_id.to_string(),
            message_id,
        });
        let faults = lock(&self.faults);
        if faults.gone_messages.contains(&message_id) {
            return Err(TransportError::Api {
                code: 400,
                description: "Bad Request: message to delete not found".to_string(),
            });
        }
        if faults.deletes_forbidden {
            return Err(TransportError::Api {
                code: 400,
                description: "Bad Request: message can't be deleted".to_string(),
            });
        }
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.record(SentAction::CallbackAnswer {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}
