//! Log retrieval backends.
//!
//! This module provides the [`LogSource`] trait the driver fetches through,
//! an HTTP implementation against the admin API, and a scripted in-memory
//! implementation for tests and demos.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{Client, Url};
use tracing::{debug, trace};

use crate::config::LogViewConfig;
use crate::error::{LogViewError, Result};
use crate::types::{BatchId, LogBatch, SubjectId};

/// Maximum number of body bytes kept in a status error.
const MAX_ERROR_BODY: usize = 512;

/// Fetches log batches for a subject.
///
/// `since == BatchId::ZERO` asks for full history; anything else asks only
/// for records newer than that batch. Implementations are expected never to
/// return records at or below `since`; the viewer does not de-duplicate.
#[allow(async_fn_in_trait)]
pub trait LogSource {
    /// Fetches records for `subject` after batch `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or answers with
    /// something that is not a log batch.
    async fn fetch_logs(&self, subject: &SubjectId, since: BatchId) -> Result<LogBatch>;
}

impl<T: LogSource> LogSource for Arc<T> {
    async fn fetch_logs(&self, subject: &SubjectId, since: BatchId) -> Result<LogBatch> {
        (**self).fetch_logs(subject, since).await
    }
}

/// Fetches logs from `GET {endpoint}/users/{subject}/debug-logs?since_id={since}`.
#[derive(Debug, Clone)]
pub struct HttpLogSource {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl HttpLogSource {
    /// Creates a source from the viewer configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid base URL or the HTTP
    /// client cannot be built.
    pub fn new(config: &LogViewConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| LogViewError::InvalidConfig(format!("invalid endpoint: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(LogViewError::InvalidConfig(format!(
                "endpoint cannot be a base URL: {endpoint}"
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            auth_token: config.auth_token.clone(),
        })
    }

    /// Builds the request URL for a fetch.
    #[must_use]
    pub fn logs_url(&self, subject: &SubjectId, since: BatchId) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["users", subject.as_str(), "debug-logs"]);
        }
        url.query_pairs_mut()
            .append_pair("since_id", &since.to_string());
        url
    }
}

impl LogSource for HttpLogSource {
    async fn fetch_logs(&self, subject: &SubjectId, since: BatchId) -> Result<LogBatch> {
        let url = self.logs_url(subject, since);
        debug!(url = %url, "Fetching logs");

        let mut request = self.client.get(url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let mut body = response.text().await?;

        if !status.is_success() {
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(LogViewError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let batch: LogBatch = serde_json::from_str(&body)?;
        trace!(count = batch.logs.len(), max_id = %batch.max_id, "Fetched logs");
        Ok(batch)
    }
}

/// A scripted response for [`MemoryLogSource`].
#[derive(Debug, Clone)]
struct Scripted {
    delay: Duration,
    outcome: std::result::Result<LogBatch, (u16, String)>,
}

/// In-memory source that replays queued responses per subject.
///
/// When a subject's queue is empty the source answers with an empty batch,
/// like a server with nothing new. Every call is recorded.
#[derive(Debug, Default)]
pub struct MemoryLogSource {
    scripts: Mutex<HashMap<SubjectId, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(SubjectId, BatchId)>>,
}

impl MemoryLogSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch for `subject`.
    pub fn push_batch(&self, subject: &SubjectId, batch: LogBatch) {
        self.push(subject, Duration::ZERO, Ok(batch));
    }

    /// Queues a batch that is delivered after `delay`.
    pub fn push_delayed(&self, subject: &SubjectId, batch: LogBatch, delay: Duration) {
        self.push(subject, delay, Ok(batch));
    }

    /// Queues a failure with the given HTTP status.
    pub fn push_error(&self, subject: &SubjectId, status: u16, body: impl Into<String>) {
        self.push(subject, Duration::ZERO, Err((status, body.into())));
    }

    fn push(
        &self,
        subject: &SubjectId,
        delay: Duration,
        outcome: std::result::Result<LogBatch, (u16, String)>,
    ) {
        self.scripts
            .lock()
            .entry(subject.clone())
            .or_default()
            .push_back(Scripted { delay, outcome });
    }

    /// Every fetch made so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(SubjectId, BatchId)> {
        self.calls.lock().clone()
    }

    /// Number of fetches made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl LogSource for MemoryLogSource {
    async fn fetch_logs(&self, subject: &SubjectId, since: BatchId) -> Result<LogBatch> {
        self.calls.lock().push((subject.clone(), since));

        let next = self
            .scripts
            .lock()
            .get_mut(subject)
            .and_then(VecDeque::pop_front);

        let Some(scripted) = next else {
            return Ok(LogBatch::new(Vec::new(), since));
        };
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted
            .outcome
            .map_err(|(status, body)| LogViewError::Status { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogRecord;

    fn http_source(endpoint: &str) -> HttpLogSource {
        HttpLogSource::new(&LogViewConfig::new(endpoint)).expect("valid endpoint")
    }

    #[test]
    fn logs_url_layout() {
        let source = http_source("https://admin.example.com/api/admin");
        let url = source.logs_url(&SubjectId::new("42"), BatchId(7));
        assert_eq!(
            url.as_str(),
            "https://admin.example.com/api/admin/users/42/debug-logs?since_id=7"
        );
    }

    #[test]
    fn logs_url_handles_trailing_slash_and_escaping() {
        let source = http_source("http://localhost:8080/api/");
        let url = source.logs_url(&SubjectId::new("a b/c"), BatchId::ZERO);
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/users/a%20b%2Fc/debug-logs?since_id=0"
        );
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let err = HttpLogSource::new(&LogViewConfig::new("not a url")).expect_err("invalid");
        assert!(matches!(err, LogViewError::InvalidConfig(_)));

        let err = HttpLogSource::new(&LogViewConfig::new("mailto:ops@example.com"))
            .expect_err("not a base");
        assert!(matches!(err, LogViewError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn memory_source_replays_then_goes_quiet() {
        let source = MemoryLogSource::new();
        let subject = SubjectId::new("u1");
        source.push_batch(
            &subject,
            LogBatch::new(vec![LogRecord::new("r1")], BatchId(3)),
        );
        source.push_error(&subject, 503, "busy");

        let first = source.fetch_logs(&subject, BatchId::ZERO).await.expect("batch");
        assert_eq!(first.max_id, BatchId(3));

        let second = source.fetch_logs(&subject, BatchId(3)).await;
        assert!(matches!(
            second,
            Err(LogViewError::Status { status: 503, .. })
        ));

        let third = source.fetch_logs(&subject, BatchId(3)).await.expect("quiet");
        assert!(third.logs.is_empty());
        assert_eq!(third.max_id, BatchId(3));

        assert_eq!(
            source.calls(),
            vec![
                (subject.clone(), BatchId::ZERO),
                (subject.clone(), BatchId(3)),
                (subject, BatchId(3)),
            ]
        );
    }

    #[tokio::test]
    async fn arc_source_delegates() {
        let source = Arc::new(MemoryLogSource::new());
        let subject = SubjectId::new("u1");
        let _ = source.fetch_logs(&subject, BatchId::ZERO).await;
        assert_eq!(source.call_count(), 1);
    }
}
