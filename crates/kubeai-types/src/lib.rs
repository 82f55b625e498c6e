//! Shared types for kubeai
//!
//! This crate contains data structures used across multiple kubeai crates.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Kind of workload logs can be collected from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    Deployment,
    StatefulSet,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
        }
    }

    /// Whether this kind resolves to pods through a label selector
    pub fn is_workload(&self) -> bool {
        !matches!(self, Self::Pod)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a resource kind string is not one we can collect from
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported resource kind: {0}")]
pub struct UnsupportedKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnsupportedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pod" | "pods" | "po" => Ok(Self::Pod),
            "deployment" | "deployments" | "deploy" => Ok(Self::Deployment),
            "statefulset" | "statefulsets" | "sts" => Ok(Self::StatefulSet),
            _ => Err(UnsupportedKind(s.to_string())),
        }
    }
}

/// A pod backing a workload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    /// Container names in declaration order
    pub containers: Vec<String>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            containers: Vec::new(),
        }
    }

    /// First declared container, read when no container is requested
    pub fn default_container(&self) -> Option<&str> {
        self.containers.first().map(String::as_str)
    }
}

/// A concrete pod/container pair logs are read from
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub pod: String,
    /// Empty when the pod's default container is used
    pub container: String,
}

impl SourceRef {
    pub fn new(pod: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            container: container.into(),
        }
    }

    /// Container name for the log request, `None` for the default container
    pub fn container_param(&self) -> Option<String> {
        if self.container.is_empty() {
            None
        } else {
            Some(self.container.clone())
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.container.is_empty() {
            f.write_str(&self.pod)
        } else {
            write!(f, "{}/{}", self.pod, self.container)
        }
    }
}

// ============================================================================
// Collection Types
// ============================================================================

/// What to collect logs from and how
#[derive(Clone, Debug)]
pub struct CollectionRequest {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    /// Restrict to a single container
    pub container: Option<String>,
    /// Read the previously terminated instance instead of the current one
    pub previous: bool,
    /// Lines per source, counted from the end
    pub tail_lines: Option<i64>,
    /// Only logs newer than this many seconds
    pub since_seconds: Option<i64>,
    pub follow: bool,
}

impl CollectionRequest {
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            container: None,
            previous: false,
            tail_lines: None,
            since_seconds: None,
            follow: false,
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_previous(mut self, previous: bool) -> Self {
        self.previous = previous;
        self
    }

    pub fn with_tail_lines(mut self, tail_lines: Option<i64>) -> Self {
        self.tail_lines = tail_lines;
        self
    }

    pub fn with_since_seconds(mut self, since_seconds: Option<i64>) -> Self {
        self.since_seconds = since_seconds;
        self
    }

    pub fn following(mut self) -> Self {
        self.follow = true;
        self
    }

    /// Human-readable target, e.g. "deployment/api in namespace prod"
    pub fn target(&self) -> String {
        format!("{}/{} in namespace {}", self.kind, self.name, self.namespace)
    }
}

/// Parse a "since" duration such as `90`, `30s`, `15m`, `2h` or `1d` into seconds.
///
/// A bare number is taken as seconds. Zero means "no lower bound" and yields `None`.
pub fn parse_since_seconds(s: &str) -> Result<Option<i64>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let (digits, multiplier) = match s.char_indices().last() {
        Some((idx, 's')) => (&s[..idx], 1),
        Some((idx, 'm')) => (&s[..idx], 60),
        Some((idx, 'h')) => (&s[..idx], 60 * 60),
        Some((idx, 'd')) => (&s[..idx], 24 * 60 * 60),
        _ => (s, 1),
    };

    let value: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}', expected e.g. 30s, 15m, 1h", s))?;
    if value < 0 {
        return Err(format!("duration '{}' must not be negative", s));
    }

    let seconds = value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("duration '{}' is too large", s))?;
    Ok((seconds > 0).then_some(seconds))
}

/// Render a duration compactly, e.g. `1h2m3s`, `2m5s` or `0s`
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}{}h{}m{}s", sign, hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}{}m{}s", sign, minutes, seconds)
    } else {
        format!("{}{}s", sign, seconds)
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// ERROR and FATAL both count as errors
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warn)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parsed log line
#[derive(Clone, Debug, Serialize)]
pub struct LogRecord {
    /// Parsed from the line, or the time the line was processed
    pub timestamp: DateTime<Utc>,

    /// Source pod name
    pub source_name: String,

    /// Source container name (empty for the default container)
    pub source_container: String,

    /// Detected log level
    pub level: LogLevel,

    /// Line content after the timestamp prefix
    pub content: String,

    /// `key=value` pairs found in the content
    pub fields: HashMap<String, String>,
}

impl LogRecord {
    pub fn new(source_name: String, source_container: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            source_name,
            source_container,
            level: LogLevel::Info,
            content: String::new(),
            fields: HashMap::new(),
        }
    }
}

// ============================================================================
// Summary Types
// ============================================================================

/// Aggregate view over a batch of log records
#[derive(Clone, Debug, Default, Serialize)]
pub struct LogSummary {
    pub total_entries: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub time_range: SummaryTimeRange,
    /// Most frequent error patterns, highest count first
    pub common_errors: Vec<LogPattern>,
    /// Most frequent warning patterns, highest count first
    pub common_warnings: Vec<LogPattern>,
    /// Pods producing the most errors
    pub error_hotspots: Vec<ErrorHotspot>,
    pub potential_issues: Vec<String>,
}

impl LogSummary {
    pub fn is_empty(&self) -> bool {
        self.total_entries == 0
    }

    /// Fraction of entries at ERROR or FATAL
    pub fn error_rate(&self) -> f64 {
        if self.total_entries == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.total_entries as f64
    }
}

/// Span of time covered by a batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SummaryTimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(rename = "duration_secs", serialize_with = "serialize_seconds")]
    pub duration: TimeDelta,
}

fn serialize_seconds<S: Serializer>(duration: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(duration.num_seconds())
}

/// A recurring, normalized message
#[derive(Clone, Debug, Serialize)]
pub struct LogPattern {
    pub pattern: String,
    pub count: usize,
    /// First few records that produced this pattern
    pub examples: Vec<LogRecord>,
}

/// Error count for one source pod
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorHotspot {
    pub source_name: String,
    pub error_count: usize,
}
