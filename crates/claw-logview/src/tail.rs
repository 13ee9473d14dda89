//! Live-tail controller.
//!
//! A synchronous state machine that decides *when* to fetch and *how* to
//! apply what comes back. It never performs I/O and never reads the clock:
//! callers pass `now` in, which keeps every transition deterministic.
//!
//! ```text
//!   select ──► Loading ──ok──► Following (debug flag on) ◄──┐ poll tick
//!                 │                 │  ▲                    │
//!                 │                 ▼  │ toggle             │
//!                 │               Idle ┘                    │
//!                 └──err──► Idle + error          Following ┘
//! ```
//!
//! Every selection bumps a [`SelectionEpoch`]. Requests carry the epoch they
//! were issued under and responses from an older epoch are dropped, so a late
//! answer for a previous subject can never leak into the current list.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::Result;
use crate::types::{BatchId, LogBatch, LogRecord, SubjectId};

/// Monotonic counter identifying one subject selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectionEpoch(pub u64);

/// Whether a fetch loads full history or only newer records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Full history, replaces the record list
    Initial,
    /// Records after the last seen batch, appended
    Incremental,
}

/// A fetch the caller should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Selection the request belongs to
    pub epoch: SelectionEpoch,
    /// Whose logs to fetch
    pub subject: SubjectId,
    /// Fetch records after this batch id; zero means full history
    pub since: BatchId,
    /// Initial or incremental
    pub kind: FetchKind,
}

/// What applying a response did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Response belonged to an older selection and was dropped
    Stale,
    /// Initial fetch replaced the record list
    Loaded {
        /// Number of records loaded
        count: usize,
    },
    /// Incremental fetch appended records
    Appended {
        /// Number of records appended
        count: usize,
    },
    /// Incremental fetch returned nothing new
    Unchanged,
    /// Initial fetch failed; the list stays empty
    LoadFailed,
    /// Incremental fetch failed; state is untouched and polling continues
    PollFailed,
}

/// Records and cursor for the current subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TailState {
    /// Records in server order; only ever appended to
    pub records: Vec<LogRecord>,
    /// Highest batch id applied so far; only ever increases
    pub last_seen_id: BatchId,
    /// Whether polling is active
    pub following: bool,
}

/// Drives initial and incremental fetches for one viewer.
#[derive(Debug)]
pub struct TailController {
    poll_interval: Duration,
    epoch: SelectionEpoch,
    subject: Option<SubjectId>,
    state: TailState,
    loading: bool,
    follow_after_load: bool,
    poll_in_flight: bool,
    next_poll_at: Option<Instant>,
    error: Option<String>,
    scroll_requested: bool,
    failed_polls: u64,
}

impl Default for TailController {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl TailController {
    /// Creates a controller with no subject selected.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            epoch: SelectionEpoch::default(),
            subject: None,
            state: TailState::default(),
            loading: false,
            follow_after_load: false,
            poll_in_flight: false,
            next_poll_at: None,
            error: None,
            scroll_requested: false,
            failed_polls: 0,
        }
    }

    /// Selects a subject, discarding everything known about the previous one.
    ///
    /// Returns the full-history fetch to perform. Once it succeeds the
    /// controller follows if `debug_enabled` is set, otherwise it stays idle.
    pub fn select(&mut self, subject: SubjectId, debug_enabled: bool) -> FetchRequest {
        self.reset();
        self.subject = Some(subject.clone());
        self.loading = true;
        self.follow_after_load = debug_enabled;

        info!(subject = %subject, epoch = self.epoch.0, debug_enabled, "Selected log subject");

        FetchRequest {
            epoch: self.epoch,
            subject,
            since: BatchId::ZERO,
            kind: FetchKind::Initial,
        }
    }

    /// Drops the current subject. Responses still in flight become stale.
    pub fn deselect(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.epoch = SelectionEpoch(self.epoch.0 + 1);
        self.subject = None;
        self.state = TailState::default();
        self.loading = false;
        self.follow_after_load = false;
        self.poll_in_flight = false;
        self.next_poll_at = None;
        self.error = None;
        self.scroll_requested = false;
        self.failed_polls = 0;
    }

    /// Returns the incremental fetch to perform if one is due at `now`.
    ///
    /// At most one poll is outstanding per selection; the next one is only
    /// scheduled once the previous response has been applied.
    pub fn poll_due(&mut self, now: Instant) -> Option<FetchRequest> {
        if !self.state.following || self.loading || self.poll_in_flight {
            return None;
        }
        let due = self.next_poll_at.is_some_and(|at| at <= now);
        if !due {
            return None;
        }
        let subject = self.subject.clone()?;

        self.poll_in_flight = true;
        self.next_poll_at = None;
        debug!(subject = %subject, since = %self.state.last_seen_id, "Polling for new log records");

        Some(FetchRequest {
            epoch: self.epoch,
            subject,
            since: self.state.last_seen_id,
            kind: FetchKind::Incremental,
        })
    }

    /// Applies the outcome of a fetch issued by this controller.
    pub fn apply(
        &mut self,
        request: &FetchRequest,
        result: Result<LogBatch>,
        now: Instant,
    ) -> Applied {
        if request.epoch != self.epoch {
            trace!(
                request_epoch = request.epoch.0,
                current_epoch = self.epoch.0,
                "Dropping response for previous selection"
            );
            return Applied::Stale;
        }

        match request.kind {
            FetchKind::Initial => self.apply_initial(result, now),
            FetchKind::Incremental => self.apply_incremental(result, now),
        }
    }

    fn apply_initial(&mut self, result: Result<LogBatch>, now: Instant) -> Applied {
        self.loading = false;
        match result {
            Ok(batch) => {
                let count = batch.logs.len();
                self.state.records = batch.logs;
                self.state.last_seen_id = batch.max_id;
                self.error = None;
                debug!(count, max_id = %batch.max_id, "Loaded log history");

                if self.follow_after_load {
                    self.start_following(now);
                    self.scroll_requested = count > 0;
                }
                Applied::Loaded { count }
            }
            Err(err) => {
                warn!(error = %err, "Initial log fetch failed");
                self.state.records.clear();
                self.state.following = false;
                self.error = Some(err.to_string());
                Applied::LoadFailed
            }
        }
    }

    fn apply_incremental(&mut self, result: Result<LogBatch>, now: Instant) -> Applied {
        self.poll_in_flight = false;

        let applied = match result {
            Ok(batch) if batch.logs.is_empty() => Applied::Unchanged,
            Ok(batch) => {
                let count = batch.logs.len();
                self.state.records.extend(batch.logs);
                self.state.last_seen_id = self.state.last_seen_id.max(batch.max_id);
                if self.state.following {
                    self.scroll_requested = true;
                }
                debug!(count, last_seen_id = %self.state.last_seen_id, "Appended log records");
                Applied::Appended { count }
            }
            Err(err) => {
                self.failed_polls += 1;
                warn!(error = %err, failed_polls = self.failed_polls, "Log poll failed, retrying next tick");
                Applied::PollFailed
            }
        };

        if self.state.following {
            self.schedule_poll(now);
        }
        applied
    }

    /// Turns following on or off. Returns true if the state changed.
    ///
    /// While the initial fetch is pending the choice is remembered and taken
    /// when it completes. Following cannot start without a loaded subject.
    /// Turning it off does not cancel a poll already in flight; that
    /// response is still applied, but no further poll is scheduled.
    pub fn set_following(&mut self, following: bool, now: Instant) -> bool {
        if self.loading {
            let changed = self.follow_after_load != following;
            self.follow_after_load = following;
            return changed;
        }
        if following == self.state.following {
            return false;
        }

        if following {
            if self.subject.is_none() || self.error.is_some() {
                return false;
            }
            self.start_following(now);
            if self.poll_in_flight {
                // Rescheduled when the outstanding poll lands.
                self.next_poll_at = None;
            }
        } else {
            self.state.following = false;
            self.next_poll_at = None;
            self.scroll_requested = false;
        }

        info!(following, "Live tail toggled");
        true
    }

    /// Mirrors a server-confirmed change of the subject's debug flag.
    pub fn debug_flag_changed(&mut self, enabled: bool, now: Instant) -> bool {
        debug!(enabled, "Subject debug flag changed");
        self.set_following(enabled, now)
    }

    fn start_following(&mut self, now: Instant) {
        self.state.following = true;
        self.schedule_poll(now);
    }

    fn schedule_poll(&mut self, now: Instant) {
        self.next_poll_at = now.checked_add(self.poll_interval);
        if self.next_poll_at.is_none() {
            warn!(poll_interval = ?self.poll_interval, "Poll interval out of range, not scheduling a poll");
        }
    }

    /// Returns and clears the "just appended, scroll to bottom" hint.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    /// When the next poll becomes due, if one is scheduled.
    #[must_use]
    pub const fn next_poll_at(&self) -> Option<Instant> {
        self.next_poll_at
    }

    /// Records for the current subject, in server order.
    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.state.records
    }

    /// Current state snapshot.
    #[must_use]
    pub const fn state(&self) -> &TailState {
        &self.state
    }

    /// Highest batch id applied so far.
    #[must_use]
    pub const fn last_seen_id(&self) -> BatchId {
        self.state.last_seen_id
    }

    /// Whether polling is active.
    #[must_use]
    pub const fn is_following(&self) -> bool {
        self.state.following
    }

    /// Whether the initial fetch is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Error from the last initial fetch, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The selected subject.
    #[must_use]
    pub const fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    /// The current selection epoch.
    #[must_use]
    pub const fn epoch(&self) -> SelectionEpoch {
        self.epoch
    }

    /// Incremental fetches that failed since the subject was selected.
    #[must_use]
    pub const fn failed_polls(&self) -> u64 {
        self.failed_polls
    }

    /// Period between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
