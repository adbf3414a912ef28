use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Events delivered back to the engine from spawned fetch tasks.
///
/// Fetches run off the engine, but every state change they cause is applied
/// by the loop that owns the engine when it receives one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The answer for a submitted prompt arrived.
    AnswerReady {
        conversation_id: String,
        message_index: usize,
        answer: String,
    },

    /// The answer fetch failed.
    AnswerFailed {
        conversation_id: String,
        message_index: usize,
        error: EngineError,
    },

    /// Suggestions for `query` arrived; `generation` identifies the keystroke
    /// that scheduled the fetch.
    SuggestionsReady {
        generation: u64,
        query: String,
        suggestions: Vec<String>,
    },

    /// The suggestion fetch for `query` failed.
    SuggestionsFailed {
        generation: u64,
        query: String,
        error: String,
    },
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Bubble colour, only set on user messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_tag: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>, color_tag: Option<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            color_tag,
            timestamp: Utc::now(),
        }
    }

    /// Empty assistant message that is filled in as the answer is revealed.
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            text: String::new(),
            color_tag: None,
            timestamp: Utc::now(),
        }
    }
}

/// A named, ordered thread of messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: String, title: String) -> Self {
        Self {
            id,
            title,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Title shown in the conversation list for a conversation started by `prompt`.
pub fn title_from_prompt(prompt: &str) -> String {
    const MAX_TITLE_CHARS: usize = 30;

    let prompt = prompt.trim();
    if prompt.chars().count() <= MAX_TITLE_CHARS {
        return prompt.to_string();
    }

    let mut title: String = prompt.chars().take(MAX_TITLE_CHARS).collect();
    title.push_str("...");
    title
}
