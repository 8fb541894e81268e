//! UI-agnostic transcript types
//!
//! These structures are what the chat-completion API receives on the wire and
//! what the history file stores on disk, so their serde shape matters: roles
//! are lowercase and message content is either a bare string or a list of
//! typed parts.

use serde::{Deserialize, Serialize};

use crate::attachment::ImageAttachment;

/// Number of characters of the first message kept as a conversation title
const TITLE_CHARS: usize = 20;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One element of a multi-part message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatRole::System, text)
    }

    /// Build a user message carrying images. Falls back to plain text when
    /// there is nothing to attach.
    pub fn user_with_images(text: &str, images: &[ImageAttachment]) -> Self {
        if images.is_empty() {
            return Self::user(text);
        }

        let mut parts = Vec::with_capacity(images.len() + 1);
        if !text.is_empty() {
            parts.push(ContentPart::Text {
                text: text.to_string(),
            });
        }
        for image in images {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            });
        }

        Self {
            role: ChatRole::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Plain text of the message, or its first text part
    pub fn text(&self) -> &str {
        match &self.content {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => parts
                .iter()
                .find_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Text shown for the message in lists and titles. Image-only messages
    /// get a placeholder.
    pub fn display_text(&self) -> String {
        let text = self.text();
        if !text.is_empty() {
            return text.to_string();
        }
        match self.image_urls().len() {
            0 => String::new(),
            1 => "[sent an image]".to_string(),
            n => format!("[sent {} images]", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub created_at: String,
}

impl Conversation {
    /// `ordinal` is the 1-based position used in the placeholder title
    pub fn new(ordinal: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: format!("New chat {}", ordinal),
            messages: Vec::new(),
            created_at: now_timestamp(),
        }
    }

    /// Append a message, retitling the conversation from its first message
    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.is_empty() {
            self.title = title_from(&message.display_text());
        }
        self.messages.push(message);
    }
}

/// Local naive ISO-8601 timestamp with microseconds
pub fn now_timestamp() -> String {
    chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

fn title_from(text: &str) -> String {
    if text.chars().count() > TITLE_CHARS {
        let head: String = text.chars().take(TITLE_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> ImageAttachment {
        ImageAttachment {
            file_name: name.to_string(),
            mime: "image/png".to_string(),
            data: "aGk=".to_string(),
        }
    }

    #[test]
    fn test_plain_message_serializes_as_string() {
        let json = serde_json::to_value(ChatMessage::user("hello")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_image_message_serializes_as_parts() {
        let msg = ChatMessage::user_with_images("look", &[image("a.png")]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "look"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGk="}}
                ]
            })
        );
    }

    #[test]
    fn test_image_only_message_has_no_text_part() {
        let msg = ChatMessage::user_with_images("", &[image("a.png"), image("b.png")]);
        assert_eq!(msg.text(), "");
        assert_eq!(msg.image_urls().len(), 2);
        assert_eq!(msg.display_text(), "[sent 2 images]");
    }

    #[test]
    fn test_parts_deserialize_from_history() {
        let raw = r#"{"role":"user","content":[{"type":"image_url","image_url":{"url":"data:image/png;base64,AA=="}},{"type":"text","text":"what is this"}]}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.text(), "what is this");
        assert_eq!(msg.image_urls(), vec!["data:image/png;base64,AA=="]);
    }

    #[test]
    fn test_first_message_sets_title() {
        let mut conv = Conversation::new(3);
        assert_eq!(conv.title, "New chat 3");

        conv.push(ChatMessage::user("short"));
        assert_eq!(conv.title, "short");

        conv.push(ChatMessage::assistant("a reply that should not retitle"));
        assert_eq!(conv.title, "short");
    }

    #[test]
    fn test_long_title_is_truncated_by_chars() {
        let mut conv = Conversation::new(1);
        conv.push(ChatMessage::user("こんにちは、今日はとても良い天気ですね。散歩に行きましょう"));
        assert_eq!(conv.title.chars().count(), TITLE_CHARS + 3);
        assert!(conv.title.ends_with("..."));
    }
}
