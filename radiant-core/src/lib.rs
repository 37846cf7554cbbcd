pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod recorder;
pub mod store;

pub use chat::{ChatReply, ChatService};
pub use config::RadiantConfig;
pub use error::{RadiantError, StorageError};
pub use llm::{ChatBackend, Invocation, InvokeError, ModelInvoker, OpenRouterClient};
pub use models::{ChatMessage, Turn, TurnInput};
pub use prompt::PromptAssembler;
pub use recorder::TurnRecorder;
pub use store::TurnStore;
