//! Core types for render-batch

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ErrorKind, ErrorRecord};

/// Rendering operation requested from the remote service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Page screenshot (PNG bytes)
    #[default]
    Screenshot,
    /// Printed page (PDF bytes)
    Pdf,
    /// Rendered HTML
    Content,
    /// Page converted to Markdown
    Markdown,
    /// Elements extracted by selector
    Scrape,
    /// Structured data extracted from the page
    Json,
}

impl OperationKind {
    /// File extension used when naming artifacts of this kind
    pub fn extension(&self) -> &'static str {
        match self {
            OperationKind::Screenshot => "png",
            OperationKind::Pdf => "pdf",
            OperationKind::Content => "html",
            OperationKind::Markdown => "md",
            OperationKind::Scrape | OperationKind::Json => "json",
        }
    }

    /// Lowercase name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Screenshot => "screenshot",
            OperationKind::Pdf => "pdf",
            OperationKind::Content => "content",
            OperationKind::Markdown => "markdown",
            OperationKind::Scrape => "scrape",
            OperationKind::Json => "json",
        }
    }
}

/// Parameters passed unchanged to every rendering call of a batch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationParams {
    /// Which rendering operation to run
    pub kind: OperationKind,
    /// Operation-specific options (viewport, selectors, PDF format, ...), opaque to the runner
    #[serde(default)]
    pub options: serde_json::Value,
}

impl OperationParams {
    /// Parameters for `kind` with no extra options
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            options: serde_json::Value::Null,
        }
    }

    /// Attach operation-specific options
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// One URL plus its parameters and its position in the batch
///
/// Immutable once enqueued; `sequence_index` is the only ordering key for output.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkItem {
    url: String,
    sequence_index: usize,
    params: OperationParams,
}

impl WorkItem {
    pub(crate) fn new(url: String, sequence_index: usize, params: OperationParams) -> Self {
        Self {
            url,
            sequence_index,
            params,
        }
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Position assigned at enqueue time
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// Operation parameters
    pub fn params(&self) -> &OperationParams {
        &self.params
    }
}

/// Payload of one successful rendering operation
#[derive(Clone, Debug, PartialEq)]
pub enum Artifact {
    /// Binary blob (screenshot, PDF)
    Binary {
        /// Operation that produced it
        kind: OperationKind,
        /// Raw bytes
        bytes: Vec<u8>,
    },
    /// Text (HTML, Markdown)
    Text {
        /// Operation that produced it
        kind: OperationKind,
        /// Text content
        text: String,
    },
    /// Structured object (scrape results, JSON extraction)
    Structured {
        /// Operation that produced it
        kind: OperationKind,
        /// JSON value
        value: serde_json::Value,
    },
}

impl Artifact {
    /// Operation that produced this artifact
    pub fn kind(&self) -> OperationKind {
        match self {
            Artifact::Binary { kind, .. }
            | Artifact::Text { kind, .. }
            | Artifact::Structured { kind, .. } => *kind,
        }
    }

    /// Size of the payload in bytes (serialized size for structured values)
    pub fn len(&self) -> usize {
        match self {
            Artifact::Binary { bytes, .. } => bytes.len(),
            Artifact::Text { text, .. } => text.len(),
            Artifact::Structured { value, .. } => value.to_string().len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Terminal state of one work item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The operation produced an artifact
    Success,
    /// Every attempt failed, or the failure was not retriable
    Failure,
}

impl OutcomeStatus {
    /// Lowercase name used in records
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failure => "failure",
        }
    }
}

/// The terminal result recorded for one work item
///
/// Exactly one of [`artifact`](Outcome::artifact) / [`error`](Outcome::error) is present.
/// Read-only once created.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    sequence_index: usize,
    url: String,
    kind: OperationKind,
    attempts: u32,
    timestamp: DateTime<Utc>,
    result: Result<Artifact, ErrorRecord>,
}

impl Outcome {
    /// Outcome for `item` after `attempts` calls
    pub fn new(item: &WorkItem, attempts: u32, result: Result<Artifact, ErrorRecord>) -> Self {
        Self {
            sequence_index: item.sequence_index(),
            url: item.url().to_string(),
            kind: item.params().kind,
            attempts,
            timestamp: Utc::now(),
            result,
        }
    }

    /// Sequence index of the work item
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// URL of the work item
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Operation that was requested
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Number of calls made to the rendering operation
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the outcome was recorded
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Success or failure
    pub fn status(&self) -> OutcomeStatus {
        match self.result {
            Ok(_) => OutcomeStatus::Success,
            Err(_) => OutcomeStatus::Failure,
        }
    }

    /// Whether the item succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Artifact of a successful item
    pub fn artifact(&self) -> Option<&Artifact> {
        self.result.as_ref().ok()
    }

    /// Final error of a failed item
    pub fn error(&self) -> Option<&ErrorRecord> {
        self.result.as_ref().err()
    }

    /// Timestamp in RFC 3339 / ISO 8601 form with millisecond precision
    pub fn timestamp_iso8601(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Give up ownership of the artifact
    pub fn into_artifact(self) -> Option<Artifact> {
        self.result.ok()
    }
}

/// Aggregate counters of a batch report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    /// Items that produced an artifact
    pub succeeded: usize,
    /// Items that ended in failure
    pub failed: usize,
    /// Items that were attempted (`succeeded + failed`)
    pub total: usize,
}

/// Complete, ordered, immutable result of one batch run
///
/// Built by [`ResultAggregator::collect`](crate::ResultAggregator::collect).
#[derive(Clone, Debug)]
pub struct BatchReport {
    pub(crate) outcomes: Vec<Outcome>,
    pub(crate) counts: SummaryCounts,
    pub(crate) cancelled: bool,
    pub(crate) elapsed: Duration,
}

impl BatchReport {
    /// Outcomes ordered by sequence index
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Items that produced an artifact
    pub fn succeeded(&self) -> usize {
        self.counts.succeeded
    }

    /// Items that ended in failure
    pub fn failed(&self) -> usize {
        self.counts.failed
    }

    /// Items that were attempted
    ///
    /// Smaller than the input count only when the run was cancelled.
    pub fn total(&self) -> usize {
        self.counts.total
    }

    /// Whether the cancellation signal was raised during the run
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Wall time of the run
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Consume the report, handing out its outcomes
    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }

    /// JSON summary: counters, cancellation flag and elapsed milliseconds
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "succeeded": self.counts.succeeded,
            "failed": self.counts.failed,
            "total": self.counts.total,
            "cancelled": self.cancelled,
            "elapsed_ms": self.elapsed.as_millis() as u64,
        })
    }
}

/// One flat row of a rendered batch report
///
/// `artifact_ref` is empty for failures; `error_message` and `error_kind` are empty for
/// successes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Sequence index of the work item
    pub sequence_index: usize,
    /// URL of the work item
    pub url: String,
    /// "success" or "failure"
    pub status: String,
    /// Calls made to the rendering operation
    pub attempts: u32,
    /// ISO 8601 timestamp of the outcome
    pub timestamp: String,
    /// File name the artifact should be stored under
    pub artifact_ref: String,
    /// Final error message
    pub error_message: String,
    /// "transient" or "permanent"
    pub error_kind: String,
}

impl Record {
    /// Ordered key/value pairs of the row
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("sequence_index", self.sequence_index.to_string()),
            ("url", self.url.clone()),
            ("status", self.status.clone()),
            ("attempts", self.attempts.to_string()),
            ("timestamp", self.timestamp.clone()),
            ("artifact_ref", self.artifact_ref.clone()),
            ("error_message", self.error_message.clone()),
            ("error_kind", self.error_kind.clone()),
        ]
    }
}

/// Event emitted during a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Workers are about to start
    BatchStarted {
        /// Items in the queue
        total: usize,
        /// Number of workers
        concurrency: usize,
    },

    /// A worker claimed an item
    ItemStarted {
        /// Sequence index of the item
        sequence_index: usize,
        /// URL of the item
        url: String,
    },

    /// An attempt failed and will be retried after a delay
    ItemRetrying {
        /// Sequence index of the item
        sequence_index: usize,
        /// Attempt that just failed (1-based)
        attempt: u32,
        /// Backoff before the next attempt
        delay_ms: u64,
        /// Error of the failed attempt
        error: String,
    },

    /// An item reached its terminal state
    ItemCompleted {
        /// Sequence index of the item
        sequence_index: usize,
        /// Final status
        status: OutcomeStatus,
        /// Calls made to the rendering operation
        attempts: u32,
        /// Error class for failures
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<ErrorKind>,
    },

    /// All workers have stopped
    BatchCompleted {
        /// Items that produced an artifact
        succeeded: usize,
        /// Items that ended in failure
        failed: usize,
        /// Items that were attempted
        total: usize,
        /// Whether the run was cancelled
        cancelled: bool,
    },
}
