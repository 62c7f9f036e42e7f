pub mod error;
pub mod validators;

pub use error::ApiError;
pub use validators::ValidationError;
