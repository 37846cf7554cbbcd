pub mod message;
pub mod turn;

pub use message::{
    ChatMessage, ContentPart, ImagePayload, ImageUrl, MessageContent, Role, TurnInput,
};
pub use turn::Turn;
