//! Colloquy Core
//!
//! The conversational side of a spoken dialogue loop: conversation history,
//! the completion-service boundary, the dialogue engine that decides whether
//! and what to answer, the output backends that voice the answer, and the
//! listeners that supply utterances.

pub mod dialogue;
pub mod history;
pub mod listener;
pub mod llm_client;
pub mod output;

pub use dialogue::{DialogueConfig, DialogueEngine, DialogueError, Reply, ReplyStream, RetryPolicy};
pub use history::{ConversationHistory, Message, Role};
pub use listener::Listener;
pub use output::{OutputConfig, Talker, TalkerKind};
