use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "New Chat";

const TITLE_MAX_CHARS: usize = 30;
const TITLE_ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Ai,
}

/// Lifecycle of a message. Only a `Streaming` message may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
            status: MessageStatus::Complete,
        }
    }

    /// An empty answer waiting for tokens.
    pub fn pending_ai() -> Self {
        Self {
            role: Role::Ai,
            content: String::new(),
            status: MessageStatus::Streaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.role == Role::Ai && self.status == MessageStatus::Streaming
    }
}

/// A conversation. `id` is assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at_ms: i64,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at_ms: now_ms(),
        }
    }

    /// The trailing message, the only one that may still be changing.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_generating(&self) -> bool {
        self.messages.last().is_some_and(Message::is_streaming)
    }

    pub(crate) fn streaming_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut().filter(|message| message.is_streaming())
    }
}

/// Title for a session whose first question is `question`.
pub fn derive_title(question: &str) -> String {
    if question.chars().count() <= TITLE_MAX_CHARS {
        return question.to_string();
    }

    let mut title = question.chars().take(TITLE_MAX_CHARS).collect::<String>();
    title.push_str(TITLE_ELLIPSIS);
    title
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
