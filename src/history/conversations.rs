use log::{ error, info, warn };
use std::sync::Arc;

use super::{ KeyValueStore, CONVERSATIONS_KEY, CURRENT_CONVERSATION_KEY };
use crate::error::{ Error, Result };
use crate::models::chat::{ ChatMessage, Conversation };

/// In-memory conversation list mirrored into a [`KeyValueStore`].
///
/// Conversations are kept newest-first. Every structural change (create,
/// select, delete, append) is written through immediately; streamed fragments
/// only touch memory until [`ConversationStore::persist`] is called.
pub struct ConversationStore {
    backend: Arc<dyn KeyValueStore>,
    conversations: Vec<Conversation>,
    current_id: Option<String>,
}

impl ConversationStore {
    /// Restores conversations and the last selection from `backend`.
    /// Unreadable history is logged and dropped rather than failing startup.
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let conversations = match backend.get(CONVERSATIONS_KEY).await? {
            Some(json) =>
                match serde_json::from_str::<Vec<Conversation>>(&json) {
                    Ok(list) => list,
                    Err(e) => {
                        error!("Error loading conversations: {}", e);
                        Vec::new()
                    }
                }
            None => Vec::new(),
        };
        let current_id = backend
            .get(CURRENT_CONVERSATION_KEY).await?
            .map(|id| id.trim().to_string())
            .filter(|id| conversations.iter().any(|c| &c.id == id));

        info!("Loaded {} conversation(s)", conversations.len());
        Ok(Self {
            backend,
            conversations,
            current_id,
        })
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::ConversationNotFound(id.to_string()))
    }

    /// Starts an empty conversation, makes it current and returns its id.
    pub async fn create(&mut self) -> Result<String> {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.current_id = Some(id.clone());
        self.persist().await?;
        Ok(id)
    }

    pub async fn select(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::ConversationNotFound(id.to_string()));
        }
        self.current_id = Some(id.to_string());
        self.persist().await
    }

    /// Removes a conversation. If it was current, the first remaining one
    /// becomes current.
    pub async fn delete(&mut self, id: &str) -> Result<()> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return Err(Error::ConversationNotFound(id.to_string()));
        }
        if self.current_id.as_deref() == Some(id) {
            self.current_id = self.conversations.first().map(|c| c.id.clone());
        }
        self.persist().await
    }

    /// Empties memory and removes both storage keys.
    pub async fn clear_all(&mut self) -> Result<()> {
        self.conversations.clear();
        self.current_id = None;
        if let Err(e) = self.backend.remove(CONVERSATIONS_KEY).await {
            warn!("Failed to clear stored conversations: {}", e);
            return Err(e);
        }
        self.backend.remove(CURRENT_CONVERSATION_KEY).await?;
        info!("All conversations cleared");
        Ok(())
    }

    pub async fn append_message(&mut self, conversation_id: &str, message: ChatMessage) -> Result<()> {
        self.get_mut(conversation_id)?.push(message);
        self.persist().await
    }

    /// Appends streamed text to a message in memory only.
    pub fn append_fragment(&mut self, conversation_id: &str, message_id: &str, fragment: &str) -> Result<()> {
        let conversation = self.get_mut(conversation_id)?;
        let message = conversation
            .message_mut(message_id)
            .ok_or_else(|| Error::ConversationNotFound(format!("{}/{}", conversation_id, message_id)))?;
        message.content.push_str(fragment);
        Ok(())
    }

    /// Applies `edit` to a message, bumps the conversation and persists.
    pub async fn update_message<F>(&mut self, conversation_id: &str, message_id: &str, edit: F) -> Result<()>
        where F: FnOnce(&mut ChatMessage)
    {
        let conversation = self.get_mut(conversation_id)?;
        let message = conversation
            .message_mut(message_id)
            .ok_or_else(|| Error::ConversationNotFound(format!("{}/{}", conversation_id, message_id)))?;
        edit(message);
        conversation.updated_at = chrono::Utc::now();
        self.persist().await
    }

    /// Writes the whole list and the current selection.
    pub async fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.conversations)?;
        self.backend.set(CONVERSATIONS_KEY, &json).await?;
        match &self.current_id {
            Some(id) => self.backend.set(CURRENT_CONVERSATION_KEY, id).await,
            None => self.backend.remove(CURRENT_CONVERSATION_KEY).await,
        }
    }
}
