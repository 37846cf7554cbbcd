use crate::config::PersonaConfig;
use crate::error::StorageError;
use crate::models::TurnInput;
use crate::store::TurnStore;

/// Writes successful exchanges to the store. Only called after the model answered.
#[derive(Debug, Clone)]
pub struct TurnRecorder {
    image_marker: String,
    image_label: String,
}

impl TurnRecorder {
    pub fn new(persona: &PersonaConfig) -> Self {
        Self {
            image_marker: persona.image_marker.clone(),
            image_label: persona.image_label.clone(),
        }
    }

    /// Text persisted as the turn's user message. Image turns become
    /// `"<marker> <text or label>"`.
    pub fn stored_user_text(&self, input: &TurnInput) -> String {
        let text = input.text.as_deref();
        if input.has_image() {
            format!("{} {}", self.image_marker, text.unwrap_or(self.image_label.as_str()))
        } else {
            text.unwrap_or_default().to_string()
        }
    }

    pub async fn record(
        &self,
        store: &TurnStore,
        input: &TurnInput,
        reply: &str,
    ) -> Result<(), StorageError> {
        store.append(&self.stored_user_text(input), reply).await
    }
}
