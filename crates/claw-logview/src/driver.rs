//! Async driver for a [`LogView`].
//!
//! The driver owns the view and a [`LogSource`]. It takes [`TailCommand`]s
//! from a [`TailHandle`], performs fetches when the tail controller asks for
//! them, and reports what changed as [`ViewEvent`]s. All state transitions
//! happen on the driver's own task; fetches run concurrently with command
//! handling but their results are applied one at a time.

use std::time::Instant;

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, info};

use crate::config::LogViewConfig;
use crate::error::{LogViewError, Result};
use crate::source::LogSource;
use crate::tail::{Applied, FetchRequest};
use crate::types::{LogBatch, LogRecord, Severity, SourceLevel, SubjectId};
use crate::view::LogView;

/// Commands accepted by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailCommand {
    /// Select a subject and load its history
    Select {
        /// Whose logs to show
        subject: SubjectId,
        /// Whether the subject has debug logging on; follows after load if so
        debug_enabled: bool,
    },
    /// Drop the current subject
    Deselect,
    /// Turn following on or off
    SetFollowing(bool),
    /// The subject's debug flag changed on the server
    DebugFlagChanged(bool),
    /// Replace the query string
    SetQuery(String),
    /// Append a category tag to the query
    AddTag(String),
    /// Replace the debug level filter
    SetLevels(Vec<SourceLevel>),
    /// Replace the severity filter
    SetSeverities(Vec<Severity>),
    /// Stop the driver
    Shutdown,
}

/// Changes reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// Initial fetch started
    Loading {
        /// Subject being loaded
        subject: SubjectId,
    },
    /// Initial fetch finished
    Loaded {
        /// Subject that was loaded
        subject: SubjectId,
        /// Records passing the current filter
        visible: Vec<LogRecord>,
        /// Whether the list should scroll to its newest record
        scroll_to_bottom: bool,
        /// Whether the view is now following
        following: bool,
    },
    /// Initial fetch failed
    LoadFailed {
        /// Subject that failed to load
        subject: SubjectId,
        /// Error to show the operator
        error: String,
    },
    /// A poll appended records that pass the current filter
    Appended {
        /// Newly visible records
        visible: Vec<LogRecord>,
        /// Whether the list should scroll to its newest record
        scroll_to_bottom: bool,
    },
    /// A poll failed; polling continues
    PollFailed {
        /// Error from the failed poll
        error: String,
        /// Failed polls since the subject was selected
        failed_polls: u64,
    },
    /// Following was turned on or off
    FollowingChanged(bool),
    /// The filter changed
    Refiltered {
        /// Records passing the new filter
        visible: Vec<LogRecord>,
        /// Drill-down suggestions for the new query
        suggestions: Vec<String>,
    },
    /// The subject was dropped
    Cleared,
}

/// Cloneable handle for sending commands to a running driver.
#[derive(Debug, Clone)]
pub struct TailHandle {
    tx: mpsc::UnboundedSender<TailCommand>,
}

impl TailHandle {
    /// Sends a raw command.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn send(&self, command: TailCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| LogViewError::ChannelClosed)
    }

    /// Selects a subject.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn select(&self, subject: SubjectId, debug_enabled: bool) -> Result<()> {
        self.send(TailCommand::Select {
            subject,
            debug_enabled,
        })
    }

    /// Drops the current subject.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn deselect(&self) -> Result<()> {
        self.send(TailCommand::Deselect)
    }

    /// Turns following on or off.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn set_following(&self, following: bool) -> Result<()> {
        self.send(TailCommand::SetFollowing(following))
    }

    /// Reports a server-confirmed debug flag change.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn debug_flag_changed(&self, enabled: bool) -> Result<()> {
        self.send(TailCommand::DebugFlagChanged(enabled))
    }

    /// Replaces the query string.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn set_query(&self, query: impl Into<String>) -> Result<()> {
        self.send(TailCommand::SetQuery(query.into()))
    }

    /// Appends a category tag to the query.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn add_tag(&self, tag: impl Into<String>) -> Result<()> {
        self.send(TailCommand::AddTag(tag.into()))
    }

    /// Replaces the debug level filter.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn set_levels(&self, levels: Vec<SourceLevel>) -> Result<()> {
        self.send(TailCommand::SetLevels(levels))
    }

    /// Replaces the severity filter.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has stopped.
    pub fn set_severities(&self, severities: Vec<Severity>) -> Result<()> {
        self.send(TailCommand::SetSeverities(severities))
    }

    /// Stops the driver.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::ChannelClosed`] if the driver has already stopped.
    pub fn shutdown(&self) -> Result<()> {
        self.send(TailCommand::Shutdown)
    }
}

type Fetch<'a> = LocalBoxFuture<'a, (FetchRequest, Result<LogBatch>)>;

/// Runs a [`LogView`] against a [`LogSource`].
///
/// The driver future is not `Send` in general; run it on the task that
/// created it, for example with `tokio::join!` next to the consumer.
pub struct TailDriver<S> {
    source: S,
    view: LogView,
    commands: mpsc::UnboundedReceiver<TailCommand>,
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl<S: LogSource> TailDriver<S> {
    /// Creates a driver with its command handle and event receiver.
    pub fn new(
        source: S,
        config: &LogViewConfig,
    ) -> (Self, TailHandle, mpsc::UnboundedReceiver<ViewEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = Self {
            source,
            view: LogView::new(config),
            commands: command_rx,
            events: event_tx,
        };
        (driver, TailHandle { tx: command_tx }, event_rx)
    }

    /// Runs until shutdown, until every handle is dropped, or until the
    /// event receiver is dropped. Returns the final view.
    pub async fn run(self) -> LogView {
        let Self {
            source,
            view,
            mut commands,
            events,
        } = self;
        let mut session = Session {
            view,
            events,
            open: true,
        };
        let mut in_flight: FuturesUnordered<Fetch<'_>> = FuturesUnordered::new();

        info!("Log view driver started");

        while session.open {
            let next_poll = session
                .view
                .controller()
                .next_poll_at()
                .map(TokioInstant::from_std);
            let poll_timer = async move {
                match next_poll {
                    Some(at) => time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("All tail handles dropped");
                        break;
                    };
                    if command == TailCommand::Shutdown {
                        break;
                    }
                    if let Some(request) = session.command(command, now()) {
                        in_flight.push(fetch(&source, request));
                    }
                }
                Some((request, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    session.response(&request, result, now());
                }
                () = poll_timer => {
                    if let Some(request) = session.view.poll_due(now()) {
                        in_flight.push(fetch(&source, request));
                    }
                }
            }
        }

        info!(pending_fetches = in_flight.len(), "Log view driver stopped");
        drop(in_flight);
        session.view
    }
}

fn now() -> Instant {
    TokioInstant::now().into_std()
}

fn fetch<S: LogSource>(source: &S, request: FetchRequest) -> Fetch<'_> {
    async move {
        let result = source.fetch_logs(&request.subject, request.since).await;
        (request, result)
    }
    .boxed_local()
}

/// Driver state that is mutated while fetches are outstanding.
struct Session {
    view: LogView,
    events: mpsc::UnboundedSender<ViewEvent>,
    open: bool,
}

impl Session {
    fn emit(&mut self, event: ViewEvent) {
        if self.events.send(event).is_err() {
            debug!("View event receiver dropped");
            self.open = false;
        }
    }

    fn visible(&self) -> Vec<LogRecord> {
        self.view.visible_records().into_iter().cloned().collect()
    }

    fn refiltered(&mut self) {
        let event = ViewEvent::Refiltered {
            visible: self.visible(),
            suggestions: self.view.suggestions(),
        };
        self.emit(event);
    }

    fn command(&mut self, command: TailCommand, now: Instant) -> Option<FetchRequest> {
        match command {
            TailCommand::Select {
                subject,
                debug_enabled,
            } => {
                let request = self.view.select(subject.clone(), debug_enabled);
                self.emit(ViewEvent::Loading { subject });
                return Some(request);
            }
            TailCommand::Deselect => {
                self.view.deselect();
                self.emit(ViewEvent::Cleared);
            }
            TailCommand::SetFollowing(following) => {
                if self.view.set_following(following, now) {
                    self.emit(ViewEvent::FollowingChanged(following));
                }
            }
            TailCommand::DebugFlagChanged(enabled) => {
                if self.view.debug_flag_changed(enabled, now) {
                    self.emit(ViewEvent::FollowingChanged(enabled));
                }
            }
            TailCommand::SetQuery(query) => {
                self.view.set_query(query);
                self.refiltered();
            }
            TailCommand::AddTag(tag) => {
                self.view.add_tag(&tag);
                self.refiltered();
            }
            TailCommand::SetLevels(levels) => {
                self.view.set_level_filter(levels);
                self.refiltered();
            }
            TailCommand::SetSeverities(severities) => {
                self.view.set_severity_filter(severities);
                self.refiltered();
            }
            TailCommand::Shutdown => {}
        }
        None
    }

    fn response(&mut self, request: &FetchRequest, result: Result<LogBatch>, now: Instant) {
        let error = result.as_ref().err().map(ToString::to_string);
        let before = self.view.controller().records().len();

        match self.view.apply(request, result, now) {
            Applied::Stale | Applied::Unchanged => {}
            Applied::Loaded { .. } => {
                let event = ViewEvent::Loaded {
                    subject: request.subject.clone(),
                    visible: self.visible(),
                    scroll_to_bottom: self.view.take_scroll_request(),
                    following: self.view.controller().is_following(),
                };
                self.emit(event);
            }
            Applied::Appended { .. } => {
                let scroll_to_bottom = self.view.take_scroll_request();
                let visible: Vec<LogRecord> =
                    self.view.visible_from(before).into_iter().cloned().collect();
                if !visible.is_empty() {
                    self.emit(ViewEvent::Appended {
                        visible,
                        scroll_to_bottom,
                    });
                }
            }
            Applied::LoadFailed => {
                let event = ViewEvent::LoadFailed {
                    subject: request.subject.clone(),
                    error: error.unwrap_or_default(),
                };
                self.emit(event);
            }
            Applied::PollFailed => {
                let event = ViewEvent::PollFailed {
                    error: error.unwrap_or_default(),
                    failed_polls: self.view.controller().failed_polls(),
                };
                self.emit(event);
            }
        }
    }
}
