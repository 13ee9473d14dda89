//! Core types for the debug log viewer.
//!
//! This module provides:
//! - [`LogRecord`] — One log entry as delivered by the server
//! - [`Severity`] — Importance of an entry (INFO, WARN, ...)
//! - [`SourceLevel`] — Client-side verbosity the entry was emitted under
//! - [`BatchId`] — Server-assigned, monotonically increasing batch marker
//! - [`LogBatch`] — One response of the log-retrieval endpoint
//! - [`ClientMetadata`] — Device details scanned from record payloads

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::LogViewError;
use crate::query;

/// Server-assigned batch marker used to request only newer records.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl BatchId {
    /// Requests the full history.
    pub const ZERO: Self = Self(0);
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the subject (usually a user) whose logs are viewed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Creates a subject identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Importance classification of a log entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational
    #[default]
    Info,
    /// Something unexpected but recoverable
    Warn,
    /// A failure
    Error,
    /// A completed operation
    Success,
    /// Developer detail
    Debug,
}

impl Severity {
    /// All severities, in display order.
    pub const ALL: [Self; 5] = [
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Success,
        Self::Debug,
    ];

    /// Parses a severity, falling back to [`Severity::Info`] for unknown values.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Returns the upper-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
            Self::Debug => "DEBUG",
        }
    }
}

impl FromStr for Severity {
    type Err = LogViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "SUCCESS" => Ok(Self::Success),
            "DEBUG" => Ok(Self::Debug),
            _ => Err(LogViewError::InvalidFilterValue(format!("unknown severity: {s}"))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side debug verbosity the entry was logged under.
///
/// Independent of [`Severity`]. Absent or unrecognised values map to `Off`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLevel {
    /// Debug logging disabled or not reported
    #[default]
    Off,
    /// Regular debug logging
    Default,
    /// Verbose debug logging
    Aggressive,
    /// Everything, including high-frequency events
    Paranoic,
}

impl SourceLevel {
    /// Parses a level, falling back to [`SourceLevel::Off`] for unknown values.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Returns the lower-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Default => "default",
            Self::Aggressive => "aggressive",
            Self::Paranoic => "paranoic",
        }
    }
}

impl FromStr for SourceLevel {
    type Err = LogViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "" => Ok(Self::Off),
            "default" => Ok(Self::Default),
            "aggressive" => Ok(Self::Aggressive),
            "paranoic" | "paranoid" => Ok(Self::Paranoic),
            _ => Err(LogViewError::InvalidFilterValue(format!("unknown debug level: {s}"))),
        }
    }
}

impl fmt::Display for SourceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log entry.
///
/// Decoding is infallible: any JSON value becomes a record. Objects are read
/// field by field with lenient fallbacks, bare strings become the message,
/// and anything else is kept verbatim with [`LogRecord::malformed`] set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct LogRecord {
    /// When the entry was created, if the server reported a parseable time
    pub timestamp: Option<DateTime<Utc>>,
    /// Importance
    pub severity: Severity,
    /// Debug verbosity the client was running with
    #[serde(rename = "debug_level")]
    pub source_level: SourceLevel,
    /// Bracketed tags, e.g. `[API] [Notifications]`
    pub category: String,
    /// Free-text message
    pub message: String,
    /// Structured payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Set when the server sent something that is neither an object nor a string.
    /// Kept on re-encode so a stored record stays unfiltered.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub malformed: bool,
}

impl LogRecord {
    /// Creates an INFO record with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the debug level.
    #[must_use]
    pub const fn with_source_level(mut self, level: SourceLevel) -> Self {
        self.source_level = level;
        self
    }

    /// Sets the category string.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Returns the bracketed tags of the category, in order.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        query::bracket_tags(&self.category).collect()
    }

    /// Returns the first bracketed tag.
    #[must_use]
    pub fn main_category(&self) -> Option<&str> {
        query::bracket_tags(&self.category).next()
    }

    /// Renders the timestamp for display. Missing timestamps render empty.
    #[must_use]
    pub fn display_timestamp(&self, format: &str) -> String {
        self.timestamp
            .map(|ts| ts.format(format).to_string())
            .unwrap_or_default()
    }

    fn from_object(mut obj: Map<String, Value>) -> Self {
        let timestamp = ["timestamp", "time", "created_at"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(parse_timestamp));
        let severity = ["severity", "level", "type"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(Severity::parse_lenient)
            .unwrap_or_default();
        let source_level = ["debug_level", "source_level", "debugLevel"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(SourceLevel::parse_lenient)
            .unwrap_or_default();
        let category = obj
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let message = match obj.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let data = match obj.remove("data") {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };

        Self {
            timestamp,
            severity,
            source_level,
            category,
            message,
            data,
            malformed: obj.get("malformed").and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

impl From<Value> for LogRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(obj) => Self::from_object(obj),
            Value::String(message) => Self::new(message),
            other => Self {
                message: other.to_string(),
                malformed: true,
                ..Self::default()
            },
        }
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// One response of the log-retrieval endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    /// Records newer than the requested batch id, oldest first
    #[serde(default)]
    pub logs: Vec<LogRecord>,
    /// Highest batch id the server knows about for this subject.
    /// `null` reads as zero and a numeric string is accepted.
    #[serde(default, deserialize_with = "lenient_batch_id")]
    pub max_id: BatchId,
}

fn lenient_batch_id<'de, D>(deserializer: D) -> Result<BatchId, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BatchId::ZERO),
        Value::Number(n) => n
            .as_u64()
            .map(BatchId)
            .ok_or_else(|| D::Error::custom(format!("invalid batch id: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map(BatchId)
            .map_err(|_| D::Error::custom(format!("invalid batch id: {s:?}"))),
        other => Err(D::Error::custom(format!("invalid batch id: {other}"))),
    }
}

impl LogBatch {
    /// Creates a batch.
    #[must_use]
    pub const fn new(logs: Vec<LogRecord>, max_id: BatchId) -> Self {
        Self { logs, max_id }
    }
}

/// Device and client details carried in the payload of a session's first record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Raw user agent string
    pub user_agent: Option<String>,
    /// Reported platform
    pub platform: Option<String>,
    /// Client IP address
    pub ip: Option<String>,
    /// Application version
    pub app_version: Option<String>,
    /// Operating system derived from platform or user agent
    pub os: Option<String>,
    /// Browser or runtime derived from the user agent
    pub browser: Option<String>,
}

impl ClientMetadata {
    /// Scans records for the first payload carrying client details.
    ///
    /// Returns `None` when no record carries any of them.
    #[must_use]
    pub fn scan(records: &[LogRecord]) -> Option<Self> {
        records
            .iter()
            .filter_map(|r| r.data.as_ref())
            .find_map(Self::from_data)
    }

    fn from_data(data: &Map<String, Value>) -> Option<Self> {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| data.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };

        let user_agent = pick(&["user_agent", "userAgent"]);
        let platform = pick(&["platform", "os"]);
        let ip = pick(&["ip", "ip_address"]);
        if user_agent.is_none() && platform.is_none() && ip.is_none() {
            return None;
        }

        let os = platform
            .as_deref()
            .and_then(os_from_platform)
            .or_else(|| user_agent.as_deref().and_then(os_from_user_agent))
            .map(str::to_string);
        let browser = user_agent
            .as_deref()
            .and_then(browser_from_user_agent)
            .map(str::to_string);

        Some(Self {
            user_agent,
            platform,
            ip,
            app_version: pick(&["app_version", "appVersion", "version"]),
            os,
            browser,
        })
    }
}

fn os_from_platform(platform: &str) -> Option<&'static str> {
    match platform.to_ascii_lowercase().as_str() {
        "ios" => Some("iOS"),
        "android" => Some("Android"),
        "web" => None,
        "windows" => Some("Windows"),
        "macos" => Some("macOS"),
        "linux" => Some("Linux"),
        _ => None,
    }
}

fn os_from_user_agent(ua: &str) -> Option<&'static str> {
    // Order matters: Android agents also say Linux, iOS agents say "like Mac OS X".
    if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        Some("iOS")
    } else if ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        Some("macOS")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    }
}

fn browser_from_user_agent(ua: &str) -> Option<&'static str> {
    if ua.contains("Edg/") {
        Some("Edge")
    } else if ua.contains("Chrome/") {
        Some("Chrome")
    } else if ua.contains("Firefox/") {
        Some("Firefox")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else if ua.contains("Dart/") || ua.contains("okhttp") || ua.contains("CFNetwork") {
        Some("Native app")
    } else {
        None
    }
}
