use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::nodes;
use super::state::{WorkflowResult, WorkflowState};
use crate::models::chat::{HistoryEntry, QueryType};
use crate::services::llm_service::LlmProvider;

pub const FAULT_RESPONSE: &str = "An error occurred while processing your request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Entry,
    Classification,
    Generation,
    Calculation,
    Recording,
    Exit,
}

impl Stage {
    pub const COUNT: usize = 6;

    pub fn name(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Classification => "classification",
            Self::Generation => "generation",
            Self::Calculation => "calculation",
            Self::Recording => "recording",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Faults in sequencing the stages, as opposed to failures inside a stage
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("state reached the router without a query type")]
    Unclassified,

    #[error("traversal exceeded {0} steps")]
    StepLimit(usize),

    #[error("stage panicked: {0}")]
    Panicked(String),
}

/// Fixed topology: one decision point after classification, one join
/// before recording.
pub struct WorkflowGraph;

impl WorkflowGraph {
    pub const START: Stage = Stage::Entry;

    /// Successor of `stage`, or None once the exit stage has run
    pub fn next(stage: Stage, state: &WorkflowState) -> Result<Option<Stage>, WorkflowError> {
        let next = match stage {
            Stage::Entry if state.rejected() => Stage::Exit,
            Stage::Entry => Stage::Classification,
            Stage::Classification => Self::route(state.query_type)?,
            Stage::Generation | Stage::Calculation => Stage::Recording,
            Stage::Recording => Stage::Exit,
            Stage::Exit => return Ok(None),
        };
        Ok(Some(next))
    }

    fn route(query_type: Option<QueryType>) -> Result<Stage, WorkflowError> {
        match query_type {
            Some(QueryType::Text) => Ok(Stage::Generation),
            Some(QueryType::Calculation) => Ok(Stage::Calculation),
            None => Err(WorkflowError::Unclassified),
        }
    }
}

/// Long-lived engine, constructed once at startup and shared by handle
pub struct WorkflowEngine {
    llm: Arc<dyn LlmProvider>,
    generation_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, generation_timeout: Duration) -> Self {
        info!("Workflow engine ready (generation timeout: {:?})", generation_timeout);
        Self {
            llm,
            generation_timeout,
        }
    }

    /// Run one query end to end. Never fails: stage failures come back in
    /// `error`, orchestration faults as `success = false` with `history`
    /// exactly as passed in.
    pub async fn process_query(
        &self,
        query: &str,
        session_id: &str,
        history: Vec<HistoryEntry>,
    ) -> WorkflowResult {
        let original_history = history.clone();
        let state = WorkflowState::new(session_id, query, history);

        match AssertUnwindSafe(self.run(state)).catch_unwind().await {
            Ok(Ok(state)) => WorkflowResult::from_state(state),
            Ok(Err(e)) => {
                error!(session_id = %session_id, "Workflow fault: {}", e);
                WorkflowResult::fault(original_history, FAULT_RESPONSE, e.to_string())
            }
            Err(payload) => {
                let e = WorkflowError::Panicked(panic_message(payload.as_ref()));
                error!(session_id = %session_id, "Workflow fault: {}", e);
                WorkflowResult::fault(original_history, FAULT_RESPONSE, e.to_string())
            }
        }
    }

    /// Traverse the graph from the entry stage until exit
    pub async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        let mut stage = WorkflowGraph::START;

        for _ in 0..Stage::COUNT {
            state = self.execute(stage, state).await;
            match WorkflowGraph::next(stage, &state)? {
                Some(next) => stage = next,
                None => return Ok(state),
            }
        }

        Err(WorkflowError::StepLimit(Stage::COUNT))
    }

    async fn execute(&self, stage: Stage, state: WorkflowState) -> WorkflowState {
        debug!(session_id = %state.session_id, stage = %stage, "Entering stage");
        match stage {
            Stage::Entry => nodes::entry(state),
            Stage::Classification => nodes::classify(state),
            Stage::Generation => {
                nodes::generate(state, self.llm.as_ref(), self.generation_timeout).await
            }
            Stage::Calculation => nodes::calculate(state),
            Stage::Recording => nodes::record(state),
            Stage::Exit => nodes::exit(state),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_service::MockLlmProvider;
    use crate::services::workflow::nodes::{CALCULATION_FALLBACK, GENERATION_FALLBACK};
    use crate::services::workflow::state::MAX_HISTORY_ENTRIES;
    use async_trait::async_trait;

    fn engine_with(llm: MockLlmProvider) -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(llm), Duration::from_secs(5))
    }

    fn engine_without_llm() -> WorkflowEngine {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().never();
        engine_with(llm)
    }

    #[test]
    fn test_graph_topology() {
        let mut state = WorkflowState::new("s", "hi", Vec::new());
        assert_eq!(WorkflowGraph::next(Stage::Entry, &state).unwrap(), Some(Stage::Classification));

        state.query_type = Some(QueryType::Text);
        assert_eq!(WorkflowGraph::next(Stage::Classification, &state).unwrap(), Some(Stage::Generation));
        state.query_type = Some(QueryType::Calculation);
        assert_eq!(WorkflowGraph::next(Stage::Classification, &state).unwrap(), Some(Stage::Calculation));

        assert_eq!(WorkflowGraph::next(Stage::Generation, &state).unwrap(), Some(Stage::Recording));
        assert_eq!(WorkflowGraph::next(Stage::Calculation, &state).unwrap(), Some(Stage::Recording));
        assert_eq!(WorkflowGraph::next(Stage::Recording, &state).unwrap(), Some(Stage::Exit));
        assert_eq!(WorkflowGraph::next(Stage::Exit, &state).unwrap(), None);
    }

    #[test]
    fn test_router_rejects_unclassified_state() {
        let state = WorkflowState::new("s", "hi", Vec::new());
        assert!(matches!(
            WorkflowGraph::next(Stage::Classification, &state),
            Err(WorkflowError::Unclassified)
        ));
    }

    #[tokio::test]
    async fn test_calculation_query() {
        let engine = engine_without_llm();
        let result = engine.process_query("what is 5 + 3?", "s1", Vec::new()).await;

        assert!(result.success);
        assert_eq!(result.query_type, Some(QueryType::Calculation));
        assert_eq!(result.calculation_result.as_deref(), Some("8"));
        assert!(result.response.contains('8'));
        assert!(result.error.is_none());
        assert_eq!(result.history.len(), 2);
    }

    #[tokio::test]
    async fn test_calculation_failure_still_succeeds() {
        let engine = engine_without_llm();
        let result = engine.process_query("calculate banana", "s1", Vec::new()).await;

        assert!(result.success);
        assert!(result.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert_eq!(result.response, CALCULATION_FALLBACK);
        assert!(result.calculation_result.is_none());
        // degraded exchanges are still recorded
        assert_eq!(result.history.len(), 2);
    }

    #[tokio::test]
    async fn test_text_query_goes_to_provider() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Ok("Hello! How can I help?".to_string()));
        let engine = engine_with(llm);

        let result = engine.process_query("hello there", "s1", Vec::new()).await;
        assert!(result.success);
        assert_eq!(result.query_type, Some(QueryType::Text));
        assert_eq!(result.response, "Hello! How can I help?");
        assert!(result.calculation_result.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_is_recoverable() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Err(anyhow::anyhow!("rate limited")));
        let engine = engine_with(llm);

        let result = engine.process_query("tell me a joke", "s1", Vec::new()).await;
        assert!(result.success);
        assert_eq!(result.response, GENERATION_FALLBACK);
        assert_eq!(result.error.as_deref(), Some("LLM error: rate limited"));
        assert_eq!(result.history.len(), 2);
    }

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_provider_timeout_is_a_generation_failure() {
        let engine = WorkflowEngine::new(Arc::new(SlowProvider), Duration::from_millis(20));

        let result = engine.process_query("tell me a story", "s1", Vec::new()).await;
        assert!(result.success);
        assert_eq!(result.response, GENERATION_FALLBACK);
        assert_eq!(
            result.error.as_deref(),
            Some("LLM error: request timed out after 0s")
        );
    }

    #[tokio::test]
    async fn test_invalid_query_short_circuits() {
        let engine = engine_without_llm();
        let history = vec![HistoryEntry::assistant("earlier")];

        let result = engine.process_query("   ", "s1", history.clone()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Query is too short"));
        assert_eq!(result.history, history);
        assert!(!result.response.is_empty());

        let too_long = "a".repeat(5001);
        let result = engine.process_query(&too_long, "s1", Vec::new()).await;
        assert!(!result.success);
        assert!(result.history.is_empty());
    }

    #[tokio::test]
    async fn test_panic_becomes_fault_with_original_history() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().returning(|_| panic!("provider exploded"));
        let engine = engine_with(llm);
        let history = vec![HistoryEntry::user("hi", Some(QueryType::Text))];

        let result = engine.process_query("hello there", "s1", history.clone()).await;
        assert!(!result.success);
        assert_eq!(result.response, FAULT_RESPONSE);
        assert_eq!(result.history, history);
        assert_eq!(result.error.as_deref(), Some("stage panicked: provider exploded"));
    }

    #[tokio::test]
    async fn test_history_is_bounded_to_ten_exchanges() {
        let engine = engine_without_llm();
        let mut history = Vec::new();

        for i in 0..11 {
            let result = engine
                .process_query(&format!("what is {i} + 1?"), "s1", history)
                .await;
            assert!(result.success);
            history = result.history;
        }

        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history[0].content, "what is 1 + 1?");
        assert_eq!(history[1].content, "The result of 1 + 1 is 2");
        assert_eq!(history[18].content, "what is 10 + 1?");
        assert_eq!(history[19].content, "The result of 10 + 1 is 11");
    }

    #[tokio::test]
    async fn test_valid_queries_always_produce_a_response() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().returning(|_| Ok(String::new()));
        let engine = engine_with(llm);

        for query in ["x", "hello", "2+2", "sum of nothing", "compute 1/0"] {
            let result = engine.process_query(query, "s1", Vec::new()).await;
            assert!(result.success, "{query}");
            assert!(!result.response.is_empty(), "{query}");
        }
    }
}
