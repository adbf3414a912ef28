use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::EngineError;
use crate::events::{Conversation, Message, Role};
use crate::storage::{CONVERSATIONS_KEY, CURRENT_CONVERSATION_KEY, KeyValueStore};

/// Everything that is persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<String>,
}

impl SessionSnapshot {
    /// Read both session keys from `store`.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let conversations = match store.get(CONVERSATIONS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).context("Failed to parse stored conversations")?,
            None => Vec::new(),
        };

        let current_conversation_id = match store.get(CURRENT_CONVERSATION_KEY)? {
            Some(raw) => serde_json::from_str::<Option<String>>(&raw)
                .context("Failed to parse stored conversation id")?,
            None => None,
        };

        Ok(Self {
            conversations,
            current_conversation_id,
        })
    }

    /// Write both session keys to `store`. An absent current id removes the key.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let conversations =
            serde_json::to_string(&self.conversations).context("Failed to serialize conversations")?;
        store.set(CONVERSATIONS_KEY, &conversations)?;

        match &self.current_conversation_id {
            Some(id) => {
                let raw = serde_json::to_string(id).context("Failed to serialize conversation id")?;
                store.set(CURRENT_CONVERSATION_KEY, &raw)?;
            }
            None => store.remove(CURRENT_CONVERSATION_KEY)?,
        }

        Ok(())
    }
}

/// Owns the conversation list (most recent first) and the selected
/// conversation. Every mutation goes through these methods.
///
/// Persistence is best-effort: failures are logged and the in-memory state
/// stays authoritative for the running session.
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    current_conversation_id: Option<String>,
    persistence: Box<dyn KeyValueStore>,
    dirty: bool,
}

impl ConversationStore {
    pub fn new(persistence: Box<dyn KeyValueStore>) -> Self {
        Self {
            conversations: Vec::new(),
            current_conversation_id: None,
            persistence,
            dirty: false,
        }
    }

    /// Replace in-memory state with what the persistence port holds.
    ///
    /// A failed load keeps the current state. Duplicate ids keep their first
    /// occurrence and a stored current id that no longer exists is dropped.
    pub fn restore(&mut self) {
        let snapshot = match SessionSnapshot::load(self.persistence.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!("Failed to restore session, starting empty: {:#}", err);
                return;
            }
        };

        let mut seen = HashSet::new();
        let mut conversations = Vec::with_capacity(snapshot.conversations.len());
        for conversation in snapshot.conversations {
            if seen.insert(conversation.id.clone()) {
                conversations.push(conversation);
            } else {
                tracing::warn!("Dropping duplicate conversation id {}", conversation.id);
            }
        }

        self.current_conversation_id = snapshot
            .current_conversation_id
            .filter(|id| seen.contains(id));
        self.conversations = conversations;
        self.dirty = false;

        tracing::debug!(
            conversations = self.conversations.len(),
            current = ?self.current_conversation_id,
            "Session restored"
        );
    }

    /// Write the full state through the persistence port, logging failures.
    pub fn persist(&mut self) {
        if let Err(err) = self.save() {
            tracing::warn!("{}", err);
        }
    }

    /// Write the full state and report whether it reached storage.
    pub fn save(&mut self) -> Result<(), EngineError> {
        self.snapshot()
            .save(self.persistence.as_ref())
            .map_err(|err| EngineError::Persistence(format!("{:#}", err)))?;
        self.dirty = false;
        Ok(())
    }

    /// Persist only if text updates happened since the last write.
    pub fn flush(&mut self) {
        if self.dirty {
            self.persist();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversations: self.conversations.clone(),
            current_conversation_id: self.current_conversation_id.clone(),
        }
    }

    /// Insert a new conversation at the front of the list and return its id.
    pub fn create_conversation(&mut self, title: &str) -> String {
        let mut id = Uuid::new_v4().to_string();
        while self.conversation(&id).is_some() {
            id = Uuid::new_v4().to_string();
        }

        self.conversations
            .insert(0, Conversation::new(id.clone(), title.to_string()));
        self.persist();
        id
    }

    /// Append to a conversation and return the new message's index.
    pub fn append_message(
        &mut self,
        conversation_id: &str,
        message: Message,
    ) -> Result<usize, EngineError> {
        let conversation = self
            .conversation_mut(conversation_id)
            .ok_or_else(|| EngineError::NotFound(conversation_id.to_string()))?;

        conversation.messages.push(message);
        let index = conversation.messages.len() - 1;
        self.persist();
        Ok(index)
    }

    /// Replace the text of an assistant message in place.
    ///
    /// Unknown conversations or indices are ignored; the reveal may still be
    /// running for a conversation that was just deleted. The change is only
    /// marked dirty, see [`ConversationStore::flush`].
    pub fn update_message_text(&mut self, conversation_id: &str, index: usize, text: &str) {
        let Some(message) = self
            .conversation_mut(conversation_id)
            .and_then(|conversation| conversation.messages.get_mut(index))
        else {
            tracing::debug!(conversation_id, index, "Ignoring text update for missing message");
            return;
        };

        if message.role != Role::Assistant {
            tracing::debug!(conversation_id, index, "Ignoring text update for user message");
            return;
        }

        message.text.clear();
        message.text.push_str(text);
        self.dirty = true;
    }

    /// Remove a conversation. When it was selected, the first remaining
    /// conversation (the most recent one) becomes selected, or none.
    pub fn delete_conversation(&mut self, conversation_id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != conversation_id);
        if self.conversations.len() == before {
            return false;
        }

        if self.current_conversation_id.as_deref() == Some(conversation_id) {
            self.current_conversation_id = self.conversations.first().map(|c| c.id.clone());
        }

        self.persist();
        true
    }

    /// Drop every conversation. The in-memory state is cleared even when the
    /// write fails.
    pub fn delete_all(&mut self) -> Result<(), EngineError> {
        self.conversations.clear();
        self.current_conversation_id = None;
        self.save()
    }

    pub fn select_conversation(&mut self, conversation_id: &str) -> Result<(), EngineError> {
        if self.conversation(conversation_id).is_none() {
            return Err(EngineError::NotFound(conversation_id.to_string()));
        }

        self.current_conversation_id = Some(conversation_id.to_string());
        self.persist();
        Ok(())
    }

    /// Deselect so the next prompt starts a fresh conversation.
    pub fn clear_selection(&mut self) {
        if self.current_conversation_id.take().is_some() {
            self.persist();
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn current_conversation_id(&self) -> Option<&str> {
        self.current_conversation_id.as_deref()
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn conversation_mut(&mut self, conversation_id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == conversation_id)
    }
}
