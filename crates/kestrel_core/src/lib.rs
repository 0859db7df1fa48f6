//! Kestrel Core - personal assistant orchestration layer.
//!
//! One user utterance in, one logged (and possibly tool-augmented) reply
//! out: the orchestrator consults the model, runs at most one round of tool
//! dispatch, and persists every exchange in the conversation store.

pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod store;
pub mod tools;

pub use config::AssistantConfig;
pub use error::StoreError;
pub use llm::{ChatApi, FakeChatClient, HttpChatClient, LlmError};
pub use orchestrator::Assistant;
pub use store::{ConversationStore, Exchange, ExportFormat};
pub use tools::{ToolKind, ToolRegistry};
