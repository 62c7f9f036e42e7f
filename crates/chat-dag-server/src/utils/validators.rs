//! Input validation and sanitation for user queries and session ids.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const MAX_QUERY_LENGTH: usize = 5000;
pub const MIN_QUERY_LENGTH: usize = 1;
pub const MAX_SESSION_ID_LENGTH: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No user query provided")]
    MissingQuery,

    #[error("Query is too short")]
    TooShort,

    #[error("Query is too long (max 5000 characters)")]
    TooLong,

    #[error("Query contains potentially harmful content")]
    HarmfulContent,

    #[error("Query is empty after sanitization")]
    EmptyAfterSanitize,

    #[error("Session ID is required")]
    MissingSessionId,

    #[error("Session ID is too long")]
    SessionIdTooLong,

    #[error("Session ID contains invalid characters")]
    SessionIdInvalidChars,
}

static HARMFUL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<script[^>]*>.*?</script>",
        r"(?i)javascript:",
        r"(?i)\bon\w+\s*=",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));
static SESSION_ID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_]+$").expect("static pattern"));

/// Check a raw query against length limits and the markup denylist
pub fn validate_query(query: &str) -> Result<(), ValidationError> {
    let trimmed = query.trim();
    let len = trimmed.chars().count();

    if len < MIN_QUERY_LENGTH {
        return Err(ValidationError::TooShort);
    }
    if len > MAX_QUERY_LENGTH {
        return Err(ValidationError::TooLong);
    }
    if contains_harmful_content(trimmed) {
        return Err(ValidationError::HarmfulContent);
    }
    Ok(())
}

fn contains_harmful_content(query: &str) -> bool {
    HARMFUL_PATTERNS.iter().any(|re| re.is_match(query))
}

/// Strip markup, collapse whitespace, trim
pub fn sanitize_query(query: &str) -> String {
    let stripped = HTML_TAG.replace_all(query, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

pub fn validate_and_sanitize(query: &str) -> Result<String, ValidationError> {
    validate_query(query)?;
    let clean = sanitize_query(query);
    if clean.is_empty() {
        return Err(ValidationError::EmptyAfterSanitize);
    }
    Ok(clean)
}

pub fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if session_id.is_empty() {
        return Err(ValidationError::MissingSessionId);
    }
    if session_id.len() > MAX_SESSION_ID_LENGTH {
        return Err(ValidationError::SessionIdTooLong);
    }
    if !SESSION_ID_CHARS.is_match(session_id) {
        return Err(ValidationError::SessionIdInvalidChars);
    }
    Ok(())
}
