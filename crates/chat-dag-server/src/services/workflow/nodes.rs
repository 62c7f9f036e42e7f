//! The individual stages. Each one takes the state by value and returns it;
//! failures are recorded in `state.error` and never returned.

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::state::{StageError, WorkflowState, MAX_HISTORY_ENTRIES};
use crate::models::chat::{HistoryEntry, Role};
use crate::services::calculator;
use crate::services::llm_service::LlmProvider;
use crate::services::query_analyzer::QueryAnalyzer;
use crate::utils::validators::validate_and_sanitize;
use crate::utils::ValidationError;

/// History entries rendered into the text prompt
pub const PROMPT_HISTORY_ENTRIES: usize = 10;

pub const GENERATION_FALLBACK: &str =
    "I apologize, but I encountered an error processing your request. Please try again.";
pub const CALCULATION_FALLBACK: &str =
    "I couldn't perform that calculation. Please provide a valid mathematical expression.";
pub const EXIT_FALLBACK: &str = "I'm sorry, I couldn't generate a response.";

const NO_HISTORY: &str = "No previous conversation.";

/// Validate and sanitize the raw query into `query`
pub fn entry(mut state: WorkflowState) -> WorkflowState {
    let outcome = match state.raw_query.as_deref() {
        Some(raw) => validate_and_sanitize(raw),
        None => Err(ValidationError::MissingQuery),
    };

    match outcome {
        Ok(clean) => {
            debug!(session_id = %state.session_id, stage = "entry", "Query accepted ({} chars)", clean.chars().count());
            state.query = clean;
        }
        Err(e) => {
            warn!(session_id = %state.session_id, stage = "entry", "Query rejected: {}", e);
            state.fail(e);
        }
    }
    state
}

pub fn classify(mut state: WorkflowState) -> WorkflowState {
    let query_type = QueryAnalyzer::classify(&state.query);
    debug!(session_id = %state.session_id, stage = "classification", "Query classified as {}", query_type);
    state.query_type = Some(query_type);
    state
}

/// Ask the provider for a reply, bounded by `timeout`
pub async fn generate(
    mut state: WorkflowState,
    llm: &dyn LlmProvider,
    timeout: Duration,
) -> WorkflowState {
    let prompt = build_prompt(&state.query, &state.history);

    match tokio::time::timeout(timeout, llm.generate(&prompt)).await {
        Ok(Ok(text)) => {
            info!(session_id = %state.session_id, stage = "generation", "Generated {} chars", text.len());
            state.response = text;
        }
        Ok(Err(e)) => {
            warn!(session_id = %state.session_id, stage = "generation", "Provider failed: {:#}", e);
            state.fail(StageError::Generation(format!("{:#}", e)));
            state.response = GENERATION_FALLBACK.to_string();
        }
        Err(_) => {
            warn!(session_id = %state.session_id, stage = "generation", "Provider timed out after {:?}", timeout);
            state.fail(StageError::Generation(format!(
                "request timed out after {}s",
                timeout.as_secs()
            )));
            state.response = GENERATION_FALLBACK.to_string();
        }
    }
    state
}

pub fn calculate(mut state: WorkflowState) -> WorkflowState {
    let expression = calculator::extract_expression(&state.query);

    match calculator::evaluate(&expression) {
        Ok(value) => {
            let result = calculator::format_number(value);
            info!(session_id = %state.session_id, stage = "calculation", "{} = {}", expression, result);
            state.response = format!("The result of {} is {}", expression, result);
            state.calculation_result = Some(result);
        }
        Err(e) => {
            warn!(session_id = %state.session_id, stage = "calculation", "Could not evaluate '{}': {}", expression, e);
            state.fail(e);
            state.calculation_result = None;
            state.response = CALCULATION_FALLBACK.to_string();
        }
    }
    state
}

/// Append the exchange and keep only the most recent entries
pub fn record(mut state: WorkflowState) -> WorkflowState {
    let now = Utc::now();

    let mut user = HistoryEntry::user(state.query.clone(), state.query_type);
    user.timestamp = Some(now);
    let mut assistant = HistoryEntry::assistant(state.response.clone());
    assistant.timestamp = Some(now);

    state.history.push(user);
    state.history.push(assistant);

    if state.history.len() > MAX_HISTORY_ENTRIES {
        let excess = state.history.len() - MAX_HISTORY_ENTRIES;
        state.history.drain(..excess);
    }

    debug!(session_id = %state.session_id, stage = "recording", "History now {} entries", state.history.len());
    state
}

pub fn exit(mut state: WorkflowState) -> WorkflowState {
    if state.response.is_empty() {
        warn!(session_id = %state.session_id, stage = "exit", "No response produced, using fallback");
        state.response = EXIT_FALLBACK.to_string();
    }
    state
}

pub fn format_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }

    let start = history.len().saturating_sub(PROMPT_HISTORY_ENTRIES);
    history[start..]
        .iter()
        .map(|entry| match entry.role {
            Role::User => format!("User: {}", entry.content),
            Role::Assistant => format!("Assistant: {}", entry.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(query: &str, history: &[HistoryEntry]) -> String {
    format!(
        "You are a helpful and friendly AI assistant. Based on the conversation history and the user's current query, provide a clear, informative, and helpful response.\n\n\
         Chat History:\n{}\n\n\
         User Query: {}\n\n\
         Assistant Response:",
        format_history(history),
        query
    )
}
