pub mod llm_service;
pub mod prompts;
pub mod reasoning_client;

pub use llm_service::LlmReasoningClient;
pub use reasoning_client::{Critique, PriorFeedback, Proposal, ReasoningClient};
