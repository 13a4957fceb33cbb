//! Caller-owned conversation history

use serde::{Deserialize, Serialize};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Standing instructions
    System,
    /// Human turn
    User,
    /// Model turn
    Assistant,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Build a message
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Messages exchanged in one conversation session
///
/// Created per session and passed explicitly into each response call; it
/// is dropped when the session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    /// Start a history, optionally seeded with a system prompt
    #[must_use]
    pub fn new(system_prompt: Option<&str>) -> Self {
        let messages = system_prompt
            .filter(|p| !p.trim().is_empty())
            .map(|p| vec![ChatMessage::new(Role::System, p)])
            .unwrap_or_default();

        Self { messages }
    }

    /// Append a user message
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::User, content));
    }

    /// Append an assistant message
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::Assistant, content));
    }

    /// Remove and return the newest non-system message
    pub fn pop_last(&mut self) -> Option<ChatMessage> {
        if self.messages.last().is_some_and(|m| m.role != Role::System) {
            self.messages.pop()
        } else {
            None
        }
    }

    /// All messages in order
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The system prompt, if any
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Messages after the system prompt
    #[must_use]
    pub fn dialogue(&self) -> &[ChatMessage] {
        if self.system_prompt().is_some() {
            &self.messages[1..]
        } else {
            &self.messages
        }
    }

    /// Number of completed user/assistant exchanges
    #[must_use]
    pub fn turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    /// Number of messages including the system prompt
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history holds no messages at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_seeding() {
        let history = ConversationHistory::new(Some("be brief"));
        assert_eq!(history.system_prompt(), Some("be brief"));
        assert_eq!(history.len(), 1);
        assert!(history.dialogue().is_empty());

        let blank = ConversationHistory::new(Some("   "));
        assert!(blank.is_empty());
    }

    #[test]
    fn test_turn_counting() {
        let mut history = ConversationHistory::new(None);
        history.push_user("hi");
        history.push_assistant("hello");
        history.push_user("how are you");

        assert_eq!(history.turns(), 1);
        assert_eq!(history.dialogue().len(), 3);
    }

    #[test]
    fn test_pop_last_keeps_system_prompt() {
        let mut history = ConversationHistory::new(Some("sys"));
        history.push_user("question");

        assert_eq!(history.pop_last().map(|m| m.content), Some("question".to_string()));
        assert_eq!(history.pop_last(), None);
        assert_eq!(history.system_prompt(), Some("sys"));
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::new(Role::Assistant, "ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
