//! Client-side filter evaluation over fetched records.
//!
//! A record is visible when:
//!
//! 1. its debug level is in the level allow-list (if the list is non-empty),
//! 2. **and** its severity is in the severity allow-list (if non-empty),
//! 3. **and** the query is empty or **at least one** query token matches.
//!
//! Tokens are OR'd. Inside one category token all tags must be present.

use std::collections::HashSet;

use crate::config::DEFAULT_TIMESTAMP_FORMAT;
use crate::query::{self, QueryToken};
use crate::types::{LogRecord, Severity, SourceLevel};

/// A query token lowered for case-insensitive matching.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    /// Sub-string of `message + " " + category`
    Contains(String),
    /// Every tag is a sub-string of the category
    AllTags(Vec<String>),
    /// Sub-string of the display timestamp
    Timestamp(String),
}

impl From<&QueryToken> for Term {
    fn from(token: &QueryToken) -> Self {
        match token {
            QueryToken::Exact { value } | QueryToken::Text { value } => {
                Self::Contains(value.to_lowercase())
            }
            QueryToken::Category { tags } => {
                Self::AllTags(tags.iter().map(|t| t.to_lowercase()).collect())
            }
            QueryToken::Timestamp { value } => Self::Timestamp(value.to_lowercase()),
        }
    }
}

/// Compiled filter: query tokens plus level and severity allow-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    terms: Vec<Term>,
    levels: HashSet<SourceLevel>,
    severities: HashSet<Severity>,
    timestamp_format: String,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordFilter {
    /// Creates a filter that accepts every record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            levels: HashSet::new(),
            severities: HashSet::new(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }

    /// Replaces the query with already-parsed tokens.
    #[must_use]
    pub fn with_tokens(mut self, tokens: &[QueryToken]) -> Self {
        self.terms = tokens.iter().map(Term::from).collect();
        self
    }

    /// Replaces the query by parsing `query`.
    #[must_use]
    pub fn with_query(self, query: &str) -> Self {
        self.with_tokens(&query::tokenize(query))
    }

    /// Adds a debug level to the allow-list.
    #[must_use]
    pub fn with_level(mut self, level: SourceLevel) -> Self {
        self.levels.insert(level);
        self
    }

    /// Replaces the debug level allow-list.
    #[must_use]
    pub fn with_levels(mut self, levels: impl IntoIterator<Item = SourceLevel>) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    /// Adds a severity to the allow-list.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severities.insert(severity);
        self
    }

    /// Replaces the severity allow-list.
    #[must_use]
    pub fn with_severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities = severities.into_iter().collect();
        self
    }

    /// Sets the chrono format used to render timestamps for `Timestamp` tokens.
    #[must_use]
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// Returns true if no query, level or severity constraint is active.
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.terms.is_empty() && self.levels.is_empty() && self.severities.is_empty()
    }

    /// Checks if a record passes the filter.
    #[must_use]
    pub fn matches(&self, record: &LogRecord) -> bool {
        // Fail open: undecodable records are always shown.
        if record.malformed {
            return true;
        }

        if !self.levels.is_empty() && !self.levels.contains(&record.source_level) {
            return false;
        }
        if !self.severities.is_empty() && !self.severities.contains(&record.severity) {
            return false;
        }

        if self.terms.is_empty() {
            return true;
        }

        let mut text: Option<String> = None;
        let mut category: Option<String> = None;
        let mut timestamp: Option<String> = None;

        self.terms.iter().any(|term| match term {
            Term::Contains(needle) => text
                .get_or_insert_with(|| {
                    format!("{} {}", record.message, record.category).to_lowercase()
                })
                .contains(needle.as_str()),
            Term::AllTags(tags) => {
                let category = category.get_or_insert_with(|| record.category.to_lowercase());
                tags.iter().all(|tag| category.contains(tag.as_str()))
            }
            Term::Timestamp(needle) => timestamp
                .get_or_insert_with(|| {
                    record
                        .display_timestamp(&self.timestamp_format)
                        .to_lowercase()
                })
                .contains(needle.as_str()),
        })
    }

    /// Returns the matching records, preserving order.
    #[must_use]
    pub fn apply<'a>(&self, records: &'a [LogRecord]) -> Vec<&'a LogRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Filters records by query tokens and allow-lists, preserving order.
///
/// Timestamps are rendered with the default display format.
#[must_use]
pub fn filter_records<'a>(
    records: &'a [LogRecord],
    tokens: &[QueryToken],
    levels: &HashSet<SourceLevel>,
    severities: &HashSet<Severity>,
) -> Vec<&'a LogRecord> {
    RecordFilter::new()
        .with_tokens(tokens)
        .with_levels(levels.iter().copied())
        .with_severities(severities.iter().copied())
        .apply(records)
}
