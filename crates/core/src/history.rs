use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single exchanged message. Fields are private so a message cannot be
/// altered once it has been recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Append-only log of the conversation, in the order messages were exchanged.
///
/// Role alternation is not enforced: when gating suppresses a reply the user's
/// message stays without an assistant answer, so two user messages may follow
/// each other.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// The `horizon` most recent messages in their original order.
    ///
    /// A horizon of zero or less yields an empty window.
    pub fn window(&self, horizon: i64) -> &[Message] {
        let take = usize::try_from(horizon.max(0))
            .unwrap_or(usize::MAX)
            .min(self.messages.len());
        &self.messages[self.messages.len() - take..]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn count(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(n: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..n {
            if i % 2 == 0 {
                history.push_user(format!("u{i}"));
            } else {
                history.push_assistant(format!("a{i}"));
            }
        }
        history
    }

    #[test]
    fn test_window_takes_most_recent_in_order() {
        let history = history_of(5);
        let window = history.window(3);
        let contents: Vec<&str> = window.iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["u2", "a3", "u4"]);
    }

    #[test]
    fn test_window_larger_than_history_returns_everything() {
        let history = history_of(2);
        assert_eq!(history.window(10).len(), 2);
    }

    #[test]
    fn test_window_non_positive_is_empty() {
        let history = history_of(4);
        assert!(history.window(0).is_empty());
        assert!(history.window(-3).is_empty());
    }

    #[test]
    fn test_consecutive_user_messages_are_allowed() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history.push_user("anyone there?");
        assert_eq!(history.len(), 2);
        assert_eq!(history.count(Role::User), 2);
        assert_eq!(history.count(Role::Assistant), 0);
    }

    #[test]
    fn test_role_display_and_serialization() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
