mod conversations;
mod file;
mod memory;

pub use conversations::ConversationStore;
pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ Error, Result };

/// Storage key holding the JSON array of conversations.
pub const CONVERSATIONS_KEY: &str = "ollama-conversations";
/// Storage key holding the id of the last selected conversation.
pub const CURRENT_CONVERSATION_KEY: &str = "ollama-current-conversation";

/// String key-value storage the conversation history is persisted into.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub fn create_history_store(
    history_type: &str,
    data_dir: &Path
) -> Result<Arc<dyn KeyValueStore>> {
    match history_type.to_lowercase().as_str() {
        "file" => Ok(Arc::new(FileStore::new(data_dir.join("history")))),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(Error::InvalidSetting(format!("Unsupported history store type: {}", other))),
    }
}

pub async fn initialize_conversation_store(
    history_type: &str,
    data_dir: &Path
) -> Result<ConversationStore> {
    info!("Chat history will be stored in: {} at {}", history_type, data_dir.display());
    let backend = create_history_store(history_type, data_dir)?;
    ConversationStore::load(backend).await
}
