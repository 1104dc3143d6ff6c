// Per-viewing chat. Messages stay local to the room and are never sent
// anywhere.

use thiserror::Error;

use pitchside_core::model::{ChatMessage, User};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("log in to chat")]
    SignedOut,

    #[error("message is empty")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct ChatRoom {
    messages: Vec<ChatMessage>,
}

impl Default for ChatRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRoom {
    /// A room holding only the system welcome line.
    pub fn new() -> Self {
        ChatRoom {
            messages: vec![ChatMessage {
                id: "1".to_string(),
                user: "System".to_string(),
                text: "Welcome to the chat! Be respectful.".to_string(),
                timestamp: "Now".to_string(),
                is_system: true,
            }],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Append a message from `user`. Blank text is refused.
    pub fn post(&mut self, user: Option<&User>, text: &str) -> Result<&ChatMessage, ChatError> {
        let user = user.ok_or(ChatError::SignedOut)?;
        if text.trim().is_empty() {
            return Err(ChatError::Empty);
        }
        self.messages.push(ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            user: user.name.clone(),
            text: text.to_string(),
            timestamp: "Just now".to_string(),
            is_system: false,
        });
        self.messages.last().ok_or(ChatError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchside_core::model::Role;

    fn fan() -> User {
        User {
            id: "u1".into(),
            name: "Fan".into(),
            email: "fan@example.com".into(),
            role: Role::Viewer,
            avatar: String::new(),
        }
    }

    #[test]
    fn starts_with_the_welcome_line() {
        let room = ChatRoom::new();
        assert_eq!(room.messages().len(), 1);
        assert!(room.messages()[0].is_system);
        assert_eq!(room.messages()[0].timestamp, "Now");
    }

    #[test]
    fn signed_in_user_can_post() {
        let mut room = ChatRoom::new();
        let msg = room.post(Some(&fan()), "What a goal!").unwrap().clone();
        assert_eq!(msg.user, "Fan");
        assert_eq!(msg.timestamp, "Just now");
        assert!(!msg.is_system);
        assert_eq!(room.messages().len(), 2);
    }

    #[test]
    fn blank_or_anonymous_posts_are_refused() {
        let mut room = ChatRoom::new();
        assert_eq!(room.post(None, "hi").unwrap_err(), ChatError::SignedOut);
        assert_eq!(room.post(Some(&fan()), "   ").unwrap_err(), ChatError::Empty);
        assert_eq!(room.messages().len(), 1);
    }
}
