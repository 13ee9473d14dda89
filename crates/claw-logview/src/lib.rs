//! # claw-logview
//!
//! Live-tailing viewer for client debug logs.
//!
//! This crate provides:
//!
//! - [`tokenize`] — Compact query language (`'exact'`, `[Category]`, words)
//! - [`RecordFilter`] — Query, debug level and severity filtering
//! - [`Taxonomy`] — Category tree from a static schema plus observed tags
//! - [`TailController`] — Initial load, incremental polling and follow state
//! - [`LogView`] — Everything a renderer needs, wired together
//! - [`TailDriver`] — Async loop running a view against a [`LogSource`]
//!
//! ## Example
//!
//! ```rust
//! use claw_logview::{LogRecord, RecordFilter, Severity};
//!
//! let records = vec![
//!     LogRecord::new("push sent").with_category("[API] [Notifications]"),
//!     LogRecord::new("timeout").with_severity(Severity::Error),
//! ];
//!
//! let filter = RecordFilter::new().with_query("[notifications] 'sent'");
//! assert_eq!(filter.apply(&records).len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod query;
pub mod source;
pub mod tail;
pub mod taxonomy;
pub mod types;
pub mod view;

// Re-export main types
pub use config::{
    LogViewConfig, DEFAULT_POLL_INTERVAL, DEFAULT_TIMESTAMP_FORMAT, MAX_POLL_INTERVAL,
};
pub use driver::{TailCommand, TailDriver, TailHandle, ViewEvent};
pub use error::{LogViewError, Result};
pub use filter::{filter_records, RecordFilter};
pub use query::{append_tag, tokenize, tokenize_spanned, QueryToken, SpannedToken};
pub use source::{HttpLogSource, LogSource, MemoryLogSource};
pub use tail::{Applied, FetchKind, FetchRequest, SelectionEpoch, TailController, TailState};
pub use taxonomy::{build_taxonomy, Taxonomy};
pub use types::{BatchId, ClientMetadata, LogBatch, LogRecord, Severity, SourceLevel, SubjectId};
pub use view::LogView;
