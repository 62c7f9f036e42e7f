//! Query Type Analyzer
//! Decides whether a query goes to the calculator or to the text generator.
//! Pure pattern matching, no external calls.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::chat::QueryType;

static CALCULATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // arithmetic operator between two numbers
        r"\d+\s*[\+\-\*/\^%\(\)]\s*\d+",
        r"\bcalculate\b",
        r"\bcompute\b",
        r"\bsolve\b",
        r"\bwhat is \d+",
        r"\bmath\b",
        r"\bsum of\b",
        r"\bproduct of\b",
        r"\bdifference\b",
        r"\bquotient\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

pub struct QueryAnalyzer;

impl QueryAnalyzer {
    /// Total and deterministic over all strings
    pub fn classify(query: &str) -> QueryType {
        let query_lower = query.to_lowercase();

        for pattern in CALCULATION_PATTERNS.iter() {
            if pattern.is_match(&query_lower) {
                debug!("Detected calculation: matched '{}'", pattern.as_str());
                return QueryType::Calculation;
            }
        }

        QueryType::Text
    }

    pub fn is_calculation(query: &str) -> bool {
        Self::classify(query) == QueryType::Calculation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculation_queries() {
        for query in [
            "2+2",
            "calculate 10 * 4",
            "what is 9 / 3",
            "What is 5 + 3?",
            "Compute the product of 6 and 7",
            "solve x",
            "12 % 5",
        ] {
            assert_eq!(QueryAnalyzer::classify(query), QueryType::Calculation, "{query}");
        }
    }

    #[test]
    fn test_text_queries() {
        for query in [
            "hello there",
            "tell me a joke",
            "what is the capital of France?",
            "I have 2 cats and 3 dogs",
            "",
        ] {
            assert_eq!(QueryAnalyzer::classify(query), QueryType::Text, "{query}");
        }
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        assert!(!QueryAnalyzer::is_calculation("aftermath of the storm"));
        assert!(QueryAnalyzer::is_calculation("help with math homework"));
    }

    #[test]
    fn test_deterministic() {
        let query = "what is 12 ^ 2";
        let first = QueryAnalyzer::classify(query);
        for _ in 0..10 {
            assert_eq!(QueryAnalyzer::classify(query), first);
        }
    }
}
