use crate::store::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "private" => ChatKind::Private,
            "group" => ChatKind::Group,
            "supergroup" => ChatKind::Supergroup,
            _ => ChatKind::Channel,
        }
    }

    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRef {
    pub id: String,
    pub kind: ChatKind,
}

impl ChatRef {
    pub fn new(id: impl ToString, kind: ChatKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
        }
    }
}

/// Membership state of a user in a chat, as reported by member-transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Creator,
    Administrator,
    Member,
    Restricted { is_member: bool },
    Left,
    Kicked,
}

impl MemberState {
    pub fn from_api(status: &str, is_member: Option<bool>) -> Option<Self> {
        match status {
            "creator" => Some(MemberState::Creator),
            "administrator" => Some(MemberState::Administrator),
            "member" => Some(MemberState::Member),
            "restricted" => Some(MemberState::Restricted {
                is_member: is_member.unwrap_or(false),
            }),
            "left" => Some(MemberState::Left),
            "kicked" => Some(MemberState::Kicked),
            _ => None,
        }
    }

    pub fn is_present(self) -> bool {
        match self {
            MemberState::Creator | MemberState::Administrator | MemberState::Member => true,
            MemberState::Restricted { is_member } => is_member,
            MemberState::Left | MemberState::Kicked => false,
        }
    }
}

/// A join is a transition from absent to present.
pub fn is_join(old: MemberState, new: MemberState) -> bool {
    !old.is_present() && new.is_present()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    pub from: Profile,
    pub chat: ChatRef,
    pub message_id: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command {
        from: Profile,
        chat: ChatRef,
        name: String,
    },
    Callback {
        id: String,
        from: Profile,
        chat: Option<ChatRef>,
        data: Option<String>,
    },
    GroupMessage(GroupMessage),
    MemberTransition {
        chat: ChatRef,
        subject: Profile,
        old: MemberState,
        new: MemberState,
    },
    NewMembers {
        chat: ChatRef,
        members: Vec<Profile>,
    },
}

impl Event {
    /// The identity whose record this event may create or update.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Event::Command { from, .. } | Event::Callback { from, .. } => Some(from.chat_id.as_str()),
            Event::GroupMessage(message) => Some(message.from.chat_id.as_str()),
            Event::MemberTransition { subject, .. } => Some(subject.chat_id.as_str()),
            Event::NewMembers { members, .. } => match members.as_slice() {
                [only] => Some(only.chat_id.as_str()),
                _ => None,
            },
        }
    }

    /// One event per identity: a service message listing several new members becomes
    /// one event per member.
    pub fn split(self) -> Vec<Event> {
        match self {
            Event::NewMembers { chat, members } if members.len() > 1 => members
                .into_iter()
                .map(|member| Event::NewMembers {
                    chat: chat.clone(),
                    members: vec![member],
                })
                .collect(),
            event => vec![event],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Command { .. } => "command",
            Event::Callback { .. } => "callback",
            Event::GroupMessage(_) => "message",
            Event::MemberTransition { .. } => "member-transition",
            Event::NewMembers { .. } => "new-members",
        }
    }
}

/// Command name from message text: `/Start@SomeBot payload` → `start`.
pub fn parse_command(text: &str) -> Option<String> {
    let token = text.trim_start().split_whitespace().next()?;
    let name = token.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}
