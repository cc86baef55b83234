use chrono::{DateTime, Utc};

/// What kind of chat an update arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Supergroup => "supergroup",
            ChatKind::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(ChatKind::Private),
            "group" => Some(ChatKind::Group),
            "supergroup" => Some(ChatKind::Supergroup),
            "channel" => Some(ChatKind::Channel),
            _ => None,
        }
    }
}

/// The chat a message came from. `title` is empty for private chats.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: i64,
    pub kind: ChatKind,
    pub title: String,
}

/// The user who sent an update. `username` is empty if the account has none.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub id: u64,
    pub username: String,
}

/// A parsed `/name args` invocation. `name` has no leading slash.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub name: String,
    pub args: String,
}

/// A normalized inbound chat message. Immutable once built.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub message_id: i32,
    pub from: Sender,
    pub chat: Chat,
    pub sent_at: DateTime<Utc>,
    pub command: Option<CommandCall>,
}

impl MessageEvent {
    /// Group id used for state bookkeeping: 0 for private chats.
    pub fn group_id(&self) -> i64 {
        if self.chat.kind == ChatKind::Private {
            0
        } else {
            self.chat.id
        }
    }
}

/// A normalized inline query.
#[derive(Debug, Clone)]
pub struct InlineQueryEvent {
    pub id: String,
    pub from: Sender,
    pub query: String,
}

/// One item on the inbound update stream.
#[derive(Debug, Clone)]
pub enum InboundUpdate {
    Message(MessageEvent),
    InlineQuery(InlineQueryEvent),
}

/// An outbound message produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i32>,
    pub silent: bool,
}

impl Reply {
    /// Reply to the message that triggered `event`.
    pub fn to(event: &MessageEvent, text: impl Into<String>) -> Self {
        Reply {
            chat_id: event.chat.id,
            text: text.into(),
            reply_to: Some(event.message_id),
            silent: false,
        }
    }

    /// Same, without a notification sound on the receiving end.
    pub fn to_silent(event: &MessageEvent, text: impl Into<String>) -> Self {
        Reply {
            silent: true,
            ..Reply::to(event, text)
        }
    }
}

/// One result row of an inline-query answer.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineResult {
    pub id: String,
    pub title: String,
    pub text: String,
}

/// Answer payload for an inline query.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineAnswer {
    pub query_id: String,
    pub results: Vec<InlineResult>,
}
