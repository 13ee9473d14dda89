//! The viewer surface handed to a renderer.
//!
//! [`LogView`] ties the tail controller to the query box, the level and
//! severity multi-selects, and the category taxonomy. Renderers read the
//! visible records and suggestions from it and feed user input back in.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;

use crate::config::LogViewConfig;
use crate::error::Result;
use crate::filter::RecordFilter;
use crate::query::{self, QueryToken};
use crate::tail::{Applied, FetchRequest, TailController};
use crate::taxonomy::{build_taxonomy, Taxonomy};
use crate::types::{ClientMetadata, LogBatch, LogRecord, Severity, SourceLevel, SubjectId};

/// Filterable, taxonomy-aware view over one live tail.
#[derive(Debug)]
pub struct LogView {
    controller: TailController,
    query: String,
    tokens: Vec<QueryToken>,
    levels: HashSet<SourceLevel>,
    severities: HashSet<Severity>,
    timestamp_format: String,
    filter: RecordFilter,
    static_schema: Taxonomy,
    taxonomy: Taxonomy,
}

impl LogView {
    /// Creates an empty view.
    #[must_use]
    pub fn new(config: &LogViewConfig) -> Self {
        let mut view = Self {
            controller: TailController::new(config.poll_interval),
            query: String::new(),
            tokens: Vec::new(),
            levels: HashSet::new(),
            severities: HashSet::new(),
            timestamp_format: config.timestamp_format.clone(),
            filter: RecordFilter::new(),
            static_schema: config.static_schema.clone(),
            taxonomy: config.static_schema.clone(),
        };
        view.rebuild_filter();
        view
    }

    /// The underlying tail controller.
    #[must_use]
    pub const fn controller(&self) -> &TailController {
        &self.controller
    }

    /// Selects a subject and returns the initial fetch to perform.
    pub fn select(&mut self, subject: SubjectId, debug_enabled: bool) -> FetchRequest {
        let request = self.controller.select(subject, debug_enabled);
        self.rebuild_taxonomy();
        request
    }

    /// Drops the current subject.
    pub fn deselect(&mut self) {
        self.controller.deselect();
        self.rebuild_taxonomy();
    }

    /// Returns the poll to perform if one is due.
    pub fn poll_due(&mut self, now: Instant) -> Option<FetchRequest> {
        self.controller.poll_due(now)
    }

    /// Applies a fetch result and refreshes the taxonomy if records changed.
    pub fn apply(&mut self, request: &FetchRequest, result: Result<LogBatch>, now: Instant) -> Applied {
        let applied = self.controller.apply(request, result, now);
        if matches!(applied, Applied::Loaded { .. } | Applied::Appended { .. }) {
            self.rebuild_taxonomy();
        }
        applied
    }

    /// Turns following on or off.
    pub fn set_following(&mut self, following: bool, now: Instant) -> bool {
        self.controller.set_following(following, now)
    }

    /// Mirrors a server-confirmed change of the subject's debug flag.
    pub fn debug_flag_changed(&mut self, enabled: bool, now: Instant) -> bool {
        self.controller.debug_flag_changed(enabled, now)
    }

    /// Returns and clears the scroll-to-bottom hint.
    pub fn take_scroll_request(&mut self) -> bool {
        self.controller.take_scroll_request()
    }

    /// Replaces the raw query string.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.tokens = query::tokenize(&self.query);
        self.rebuild_filter();
    }

    /// Appends a category tag to the query as a new bracket group.
    pub fn add_tag(&mut self, tag: &str) {
        let query = query::append_tag(&self.query, tag);
        self.set_query(query);
    }

    /// Replaces the debug level multi-select. Empty means all levels.
    pub fn set_level_filter(&mut self, levels: impl IntoIterator<Item = SourceLevel>) {
        self.levels = levels.into_iter().collect();
        self.rebuild_filter();
    }

    /// Replaces the severity multi-select. Empty means all severities.
    pub fn set_severity_filter(&mut self, severities: impl IntoIterator<Item = Severity>) {
        self.severities = severities.into_iter().collect();
        self.rebuild_filter();
    }

    fn rebuild_filter(&mut self) {
        self.filter = RecordFilter::new()
            .with_tokens(&self.tokens)
            .with_levels(self.levels.iter().copied())
            .with_severities(self.severities.iter().copied())
            .with_timestamp_format(self.timestamp_format.clone());
    }

    fn rebuild_taxonomy(&mut self) {
        self.taxonomy = build_taxonomy(&self.static_schema, self.controller.records());
    }

    /// The raw query string.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Tokens parsed from the query.
    #[must_use]
    pub fn tokens(&self) -> &[QueryToken] {
        &self.tokens
    }

    /// The active filter.
    #[must_use]
    pub const fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    /// All records passing the filter, in server order.
    #[must_use]
    pub fn visible_records(&self) -> Vec<&LogRecord> {
        self.filter.apply(self.controller.records())
    }

    /// Records from position `from` on that pass the filter.
    ///
    /// Lets a renderer print only what a poll appended.
    #[must_use]
    pub fn visible_from(&self, from: usize) -> Vec<&LogRecord> {
        self.controller
            .records()
            .get(from..)
            .map(|tail| self.filter.apply(tail))
            .unwrap_or_default()
    }

    /// Number of visible records per severity.
    #[must_use]
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for record in self.visible_records() {
            *counts.entry(record.severity).or_insert(0) += 1;
        }
        counts
    }

    /// The current taxonomy.
    #[must_use]
    pub const fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Main categories, sorted.
    #[must_use]
    pub fn main_categories(&self) -> Vec<&str> {
        self.taxonomy.main_categories()
    }

    /// Known sub-tags of a main category.
    #[must_use]
    pub fn sub_tags(&self, main: &str) -> Option<&BTreeSet<String>> {
        self.taxonomy.sub_tags(main)
    }

    /// Drill-down suggestions for the current query.
    #[must_use]
    pub fn suggestions(&self) -> Vec<String> {
        self.taxonomy.suggestions(&self.tokens)
    }

    /// Client details from the first record carrying them.
    #[must_use]
    pub fn client_metadata(&self) -> Option<ClientMetadata> {
        ClientMetadata::scan(self.controller.records())
    }

    /// Format used to render timestamps.
    #[must_use]
    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }
}
