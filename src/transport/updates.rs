//! Bot API update payloads and their translation into [`Event`]s.

use crate::events::{parse_command, ChatKind, ChatRef, Event, GroupMessage, MemberState};
use crate::store::Profile;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn profile(&self) -> Profile {
        Profile {
            chat_id: self.id.to_string(),
            username: self.username.clone().unwrap_or_default(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone().unwrap_or_default(),
            is_bot: self.is_bot,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    pub fn chat_ref(&self) -> ChatRef {
        ChatRef::new(self.id, ChatKind::from_api(&self.kind))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub new_chat_members: Vec<User>,
    pub left_chat_member: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
    pub is_member: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub old_chat_member: ChatMember,
    pub new_chat_member: ChatMember,
}

/// Translate one update. Updates this bot does not act on produce no event.
pub fn translate(update: Update) -> Option<Event> {
    if let Some(message) = update.message {
        return translate_message(message);
    }

    if let Some(query) = update.callback_query {
        return Some(Event::Callback {
            id: query.id,
            from: query.from.profile(),
            chat: query.message.map(|message| message.chat.chat_ref()),
            data: query.data,
        });
    }

    if let Some(change) = update.chat_member {
        let old = MemberState::from_api(
            &change.old_chat_member.status,
            change.old_chat_member.is_member,
        );
        let new = MemberState::from_api(
            &change.new_chat_member.status,
            change.new_chat_member.is_member,
        );
        return match (old, new) {
            (Some(old), Some(new)) => Some(Event::MemberTransition {
                chat: change.chat.chat_ref(),
                subject: change.new_chat_member.user.profile(),
                old,
                new,
            }),
            _ => {
                log::debug!(
                    "Ignoring member transition with unknown status: {} -> {}",
                    change.old_chat_member.status,
                    change.new_chat_member.status
                );
                None
            }
        };
    }

    log::debug!("Ignoring update {} with no handled payload", update.update_id);
    None
}

fn translate_message(message: Message) -> Option<Event> {
    let chat = message.chat.chat_ref();

    if !message.new_chat_members.is_empty() {
        return Some(Event::NewMembers {
            chat,
            members: message.new_chat_members.iter().map(User::profile).collect(),
        });
    }

    // "X left the group" notices carry no content worth moderating.
    if message.left_chat_member.is_some() {
        return None;
    }

    let from = message.from?.profile();
    let text = message.text.or(message.caption);

    if chat.kind == ChatKind::Private {
        if let Some(name) = text.as_deref().and_then(parse_command) {
            return Some(Event::Command { from, chat, name });
        }
    }

    Some(Event::GroupMessage(GroupMessage {
        from,
        chat,
        message_id: message.message_id,
        text,
    }))
}
