use serde::Serialize;
use thiserror::Error;

use crate::models::chat::{HistoryEntry, QueryType, SessionId};
use crate::services::calculator::EvalError;
use crate::utils::ValidationError;

/// Rolling history bound: 10 exchanges
pub const MAX_HISTORY_ENTRIES: usize = 20;

/// What a stage records into `WorkflowState::error`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("LLM error: {0}")]
    Generation(String),

    #[error("Calculation error: {0}")]
    Calculation(#[from] EvalError),
}

impl StageError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// The record threaded through every stage of one query.
///
/// Owned by a single in-flight execution; stages take it by value and
/// hand it back.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub session_id: SessionId,
    pub raw_query: Option<String>,
    pub query: String,
    pub query_type: Option<QueryType>,
    pub response: String,
    pub calculation_result: Option<String>,
    pub error: Option<StageError>,
    pub history: Vec<HistoryEntry>,
}

impl WorkflowState {
    pub fn new(
        session_id: impl Into<SessionId>,
        raw_query: impl Into<String>,
        history: Vec<HistoryEntry>,
    ) -> Self {
        let raw_query = raw_query.into();
        Self {
            session_id: session_id.into(),
            query: raw_query.clone(),
            raw_query: Some(raw_query),
            query_type: None,
            response: String::new(),
            calculation_result: None,
            error: None,
            history,
        }
    }

    /// Record a stage failure. The first error wins; later ones are dropped.
    pub fn fail(&mut self, error: impl Into<StageError>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }

    pub fn rejected(&self) -> bool {
        self.error.as_ref().is_some_and(StageError::is_validation)
    }
}

/// Structured outcome of `process_query`
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub response: String,
    pub query_type: Option<QueryType>,
    pub history: Vec<HistoryEntry>,
    pub calculation_result: Option<String>,
    pub error: Option<String>,
}

impl WorkflowResult {
    pub(crate) fn from_state(state: WorkflowState) -> Self {
        if let Some(err) = state.error.as_ref().filter(|e| e.is_validation()) {
            return Self {
                success: false,
                response: format!("Invalid query: {}", err),
                query_type: None,
                history: state.history,
                calculation_result: None,
                error: Some(err.to_string()),
            };
        }

        Self {
            success: true,
            response: state.response,
            query_type: state.query_type,
            history: state.history,
            calculation_result: state.calculation_result,
            error: state.error.map(|e| e.to_string()),
        }
    }

    pub(crate) fn fault(history: Vec<HistoryEntry>, response: &str, error: String) -> Self {
        Self {
            success: false,
            response: response.to_string(),
            query_type: None,
            history,
            calculation_result: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let mut state = WorkflowState::new("s1", "2 / 0", Vec::new());
        state.fail(EvalError::DivisionByZero);
        state.fail(StageError::Generation("late".to_string()));

        assert_eq!(state.error, Some(StageError::Calculation(EvalError::DivisionByZero)));
        assert_eq!(
            state.error.unwrap().to_string(),
            "Calculation error: division by zero"
        );
    }

    #[test]
    fn test_rejected_result_keeps_history() {
        let history = vec![HistoryEntry::assistant("earlier")];
        let mut state = WorkflowState::new("s1", "", history.clone());
        state.fail(ValidationError::TooShort);

        let result = WorkflowResult::from_state(state);
        assert!(!result.success);
        assert_eq!(result.response, "Invalid query: Query is too short");
        assert_eq!(result.history, history);
    }
}
