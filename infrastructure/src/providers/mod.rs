//! Model provider adapters
//!
//! [`HttpBackendFactory`] picks an adapter per [`ModelProvider`]:
//!
//! | Provider | Adapter | Endpoint |
//! |---|---|---|
//! | `openai` | [`OpenAiBackend`] | `/v1/chat/completions` |
//! | `google` | [`OpenAiBackend`] | Gemini OpenAI-compatible endpoint |
//! | `anthropic` | [`AnthropicBackend`] | `/v1/messages` |
//!
//! [`ModelProvider`]: reagent_domain::ModelProvider

pub mod anthropic;
pub mod factory;
pub mod naming;
pub mod openai;
mod status;

pub use anthropic::AnthropicBackend;
pub use factory::{HttpBackendFactory, default_key_vars};
pub use naming::ToolNameMap;
pub use openai::OpenAiBackend;
