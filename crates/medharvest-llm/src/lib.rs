//! medharvest-llm: chat-completion backends used by the extraction tiers.
//!
//! Every backend speaks the OpenAI chat-completions dialect (GLM and OpenAI
//! both do) and routes its HTTP calls through the shared retry policy.

pub mod backend;
pub mod json;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiCompatibleBackend};
pub use json::{parse_json_object, JsonRecovery};
