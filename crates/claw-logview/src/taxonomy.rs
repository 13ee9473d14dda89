//! Category taxonomy: main categories and their sub-tags.
//!
//! The taxonomy starts from a static schema and is widened with every tag
//! combination seen in fetched records. It only grows, and it is rebuilt from
//! scratch whenever the record set changes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::{self, QueryToken};
use crate::types::LogRecord;

/// Main category name to known sub-tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Taxonomy(BTreeMap<String, BTreeSet<String>>);

impl Taxonomy {
    /// Creates an empty taxonomy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in schema the viewer ships with.
    #[must_use]
    pub fn builtin() -> Self {
        let schema: &[(&str, &[&str])] = &[
            ("API", &["Auth", "Notifications", "Points", "Settings", "Users"]),
            ("Auth", &["Login", "Logout", "Session", "Token"]),
            ("Navigation", &["Deeplink", "Screen"]),
            ("Network", &["Offline", "Request", "Response", "Timeout"]),
            ("Notifications", &["Permissions", "Push", "Received", "Token"]),
            ("Storage", &["Cache", "Preferences"]),
            ("Lifecycle", &["Background", "Foreground", "Launch"]),
        ];

        let mut taxonomy = Self::new();
        for (main, subs) in schema {
            for sub in *subs {
                taxonomy.insert(main, Some(*sub));
            }
        }
        taxonomy
    }

    /// Loads a schema from a JSON file of the form `{"Main": ["Sub", ...]}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid schema.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Adds a main category and, optionally, one of its sub-tags.
    pub fn insert(&mut self, main: &str, sub: Option<&str>) {
        let subs = self.0.entry(main.to_string()).or_default();
        if let Some(sub) = sub {
            subs.insert(sub.to_string());
        }
    }

    /// Records the tags of one category string.
    ///
    /// The first tag becomes (or extends) a main category, every following
    /// tag is added as its sub-tag. Strings without tags are ignored.
    pub fn observe(&mut self, category: &str) {
        let mut tags = query::bracket_tags(category);
        let Some(main) = tags.next() else {
            return;
        };
        let subs = self.0.entry(main.to_string()).or_default();
        for sub in tags {
            subs.insert(sub.to_string());
        }
    }

    /// Returns the main categories, sorted.
    #[must_use]
    pub fn main_categories(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// Returns the known sub-tags of a main category.
    #[must_use]
    pub fn sub_tags(&self, main: &str) -> Option<&BTreeSet<String>> {
        self.0.get(main)
    }

    /// Returns true if the main category is known.
    #[must_use]
    pub fn contains(&self, main: &str) -> bool {
        self.0.contains_key(main)
    }

    /// Number of main categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no category is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if every category and sub-tag of `other` is also here.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        other.0.iter().all(|(main, subs)| {
            self.0
                .get(main)
                .is_some_and(|mine| subs.is_subset(mine))
        })
    }

    /// Suggests tags for the query builder.
    ///
    /// Without a category in the query this lists the main categories. Once
    /// a known main category is present, it lists that category's sub-tags
    /// not already in the query.
    #[must_use]
    pub fn suggestions(&self, tokens: &[QueryToken]) -> Vec<String> {
        let in_order = || tokens.iter().filter_map(QueryToken::tags).flatten();
        let used: BTreeSet<&str> = in_order().map(String::as_str).collect();

        match in_order().find_map(|tag| self.0.get_key_value(tag.as_str())) {
            None => self.0.keys().cloned().collect(),
            Some((_, subs)) => subs
                .iter()
                .filter(|sub| !used.contains(sub.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// Builds the taxonomy for a record set on top of a static schema.
///
/// The schema is copied, never mutated, so calling this again with the same
/// inputs gives an equal result.
#[must_use]
pub fn build_taxonomy(static_schema: &Taxonomy, records: &[LogRecord]) -> Taxonomy {
    let mut taxonomy = static_schema.clone();
    for record in records {
        taxonomy.observe(&record.category);
    }
    taxonomy
}
