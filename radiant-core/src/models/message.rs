//! Chat message shapes sent to the completions API, plus the normalized
//! input of one user turn.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }
}

/// Plain string for system and replayed entries, a part list for the new
/// user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Image as received from the browser: either a full data URI or bare base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload(String);

impl ImagePayload {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Data URL suitable for an `image_url` part. Bare base64 is assumed to be JPEG.
    pub fn data_url(&self) -> String {
        let raw = self.0.trim();
        if raw.starts_with("data:") {
            raw.to_string()
        } else {
            format!("data:image/jpeg;base64,{}", raw)
        }
    }
}

/// The new user turn. Empty or whitespace-only fields count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnInput {
    pub text: Option<String>,
    pub image: Option<ImagePayload>,
}

impl TurnInput {
    pub fn new(message: Option<String>, image: Option<String>) -> Self {
        Self {
            text: message.filter(|m| !m.trim().is_empty()),
            image: image
                .filter(|i| !i.trim().is_empty())
                .map(ImagePayload::new),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }
}
