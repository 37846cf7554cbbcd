//! Builds the message list for one completion call: persona, replayed
//! history, then the new user turn.

use crate::config::{HistoryConfig, PersonaConfig};
use crate::models::{ChatMessage, ContentPart, ImageUrl, Role, Turn, TurnInput};

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_prompt: String,
    image_caption: String,
    max_turns: Option<usize>,
}

impl PromptAssembler {
    pub fn new(persona: &PersonaConfig, history: &HistoryConfig) -> Self {
        Self {
            system_prompt: persona.system_prompt.clone(),
            image_caption: persona.image_caption.clone(),
            max_turns: history.max_turns,
        }
    }

    /// Deterministic for a given history and input. Without a `max_turns`
    /// cap the result has exactly `1 + 2 * history.len() + 1` entries.
    pub fn assemble(&self, history: &[Turn], input: &TurnInput) -> Vec<ChatMessage> {
        let replayed = match self.max_turns {
            Some(cap) => &history[history.len().saturating_sub(cap)..],
            None => history,
        };

        let mut messages = Vec::with_capacity(2 + replayed.len() * 2);
        messages.push(ChatMessage::text(Role::System, self.system_prompt.as_str()));

        for turn in replayed {
            messages.push(ChatMessage::text(Role::User, turn.user_text.as_str()));
            messages.push(ChatMessage::text(Role::Assistant, turn.ai_text.as_str()));
        }

        messages.push(ChatMessage::parts(Role::User, self.user_parts(input)));
        messages
    }

    fn user_parts(&self, input: &TurnInput) -> Vec<ContentPart> {
        match (&input.image, &input.text) {
            (Some(image), text) => vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                },
                ContentPart::Text {
                    text: text.clone().unwrap_or_else(|| self.image_caption.clone()),
                },
            ],
            (None, Some(text)) => vec![ContentPart::Text { text: text.clone() }],
            // Rejected upstream by the HTTP layer; kept total here.
            (None, None) => Vec::new(),
        }
    }
}
