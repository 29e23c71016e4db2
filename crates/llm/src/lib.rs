//! OpsDesk LLM
//!
//! Completion boundary for the orchestrator:
//! - `CompletionClient` - the `complete(prompt, system_prompt?)` seam used by
//!   the planner and step executor
//! - `LlmProvider` - provider trait with an OpenAI-compatible implementation
//! - HTTP client factory with proxy support

pub mod completion;
pub mod http_client;
pub mod openai;
pub mod provider;
pub mod types;

// Re-export main types
pub use completion::{CompletionClient, ProviderCompletionClient, DEFAULT_SYSTEM_PROMPT};
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use types::*;
