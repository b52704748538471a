use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Conversation";
const TITLE_MAX_CHARS: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSource {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub has_animated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_stats: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SearchSource>>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            has_animated: false,
            verbose_stats: None,
            sources: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Empty assistant message that grows as streamed fragments arrive.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Appends a message and bumps `updated_at`. Titles the conversation from
    /// its first user message.
    pub fn push(&mut self, message: ChatMessage) {
        if message.role == Role::User && !self.messages.iter().any(|m| m.role == Role::User) {
            self.title = title_from_message(&message.content);
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn message(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

pub fn title_from_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_first_message_becomes_title() {
        let mut conv = Conversation::new();
        assert_eq!(conv.title, DEFAULT_TITLE);
        conv.push(ChatMessage::user("Hello there"));
        assert_eq!(conv.title, "Hello there");
    }

    #[test]
    fn long_first_message_is_truncated_on_char_boundary() {
        let mut conv = Conversation::new();
        let long = "é".repeat(40);
        conv.push(ChatMessage::user(long));
        assert_eq!(conv.title, format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn later_messages_keep_the_title() {
        let mut conv = Conversation::new();
        conv.push(ChatMessage::user("first"));
        conv.push(ChatMessage::assistant_placeholder());
        conv.push(ChatMessage::user("second"));
        assert_eq!(conv.title, "first");
        let roles: Vec<Role> = conv.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    }

    #[test]
    fn persisted_shape_uses_camel_case() {
        let mut msg = ChatMessage::user("hi");
        msg.has_animated = true;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["hasAnimated"], true);
        assert!(json.get("verboseStats").is_none());

        let conv = Conversation::new();
        let json = serde_json::to_value(&conv).unwrap();
        assert!(json.get("updatedAt").is_some());
    }
}
