//! Six-stage query workflow
//!
//! entry -> classification -> (generation | calculation) -> recording -> exit
//!
//! Stages live in `nodes`, the topology and the traversal in `graph`,
//! the shared record in `state`.

mod graph;
pub mod nodes;
mod state;

pub use graph::{Stage, WorkflowEngine, WorkflowError, WorkflowGraph, FAULT_RESPONSE};
pub use state::{StageError, WorkflowResult, WorkflowState, MAX_HISTORY_ENTRIES};
