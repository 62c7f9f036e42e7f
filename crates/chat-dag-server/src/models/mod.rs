pub mod chat;

pub use chat::{HistoryEntry, QueryType, Role, SessionId};
