pub mod calculator;
pub mod conversation;
pub mod llm_service;
pub mod query_analyzer;
pub mod workflow;

pub use conversation::{ConversationManager, SessionCache};
pub use llm_service::{LlmProvider, LlmService};
pub use query_analyzer::QueryAnalyzer;
pub use workflow::WorkflowEngine;
