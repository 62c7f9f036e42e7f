pub mod models;
pub mod pool;
pub mod repository;

pub use models::*;
pub use pool::DbPool;
pub use repository::{save_exchange, MessageStore, Repository};

#[cfg(test)]
pub use repository::MockMessageStore;
