//! Session conversation state
//!
//! - TTL session history cache (DashMap, lazy expiry)
//! - Manager tying the cache, the durable store and the workflow engine together

mod cache;
pub mod manager;

pub use cache::{SessionCache, DEFAULT_TTL};
pub use manager::{ConversationManager, SERVICE_FAULT_RESPONSE};

pub use crate::models::chat::{HistoryEntry, SessionId};
