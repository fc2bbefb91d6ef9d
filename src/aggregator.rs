//! Aggregation of per-item outcomes into reports, records and sink deliveries
//!
//! Workers finish in arbitrary order; [`collect`] restores `sequence_index` order before
//! the report is frozen. [`to_records`] is a pure function of the report, so rendering the
//! same report twice always yields the same rows.

use std::time::Duration;

use crate::error::Result;
use crate::sink::Sink;
use crate::types::{BatchReport, Outcome, Record, SummaryCounts};
use crate::utils::artifact_file_name;

/// Build a report from outcomes emitted in any order
pub fn collect<I>(outcomes: I) -> BatchReport
where
    I: IntoIterator<Item = Outcome>,
{
    collect_run(outcomes, false, Duration::ZERO)
}

/// Build the report of a finished run
pub(crate) fn collect_run<I>(outcomes: I, cancelled: bool, elapsed: Duration) -> BatchReport
where
    I: IntoIterator<Item = Outcome>,
{
    let mut outcomes: Vec<Outcome> = outcomes.into_iter().collect();
    outcomes.sort_by_key(|outcome| outcome.sequence_index());
    debug_assert!(
        outcomes
            .windows(2)
            .all(|pair| pair[0].sequence_index() != pair[1].sequence_index()),
        "duplicate outcome for one work item"
    );

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let counts = SummaryCounts {
        succeeded,
        failed: outcomes.len() - succeeded,
        total: outcomes.len(),
    };

    BatchReport {
        outcomes,
        counts,
        cancelled,
        elapsed,
    }
}

/// One flat row per outcome, in `sequence_index` order
pub fn to_records(report: &BatchReport) -> Vec<Record> {
    report.outcomes().iter().map(to_record).collect()
}

fn to_record(outcome: &Outcome) -> Record {
    let (artifact_ref, error_message, error_kind) = match outcome.error() {
        None => (
            artifact_file_name(outcome.url(), outcome.sequence_index(), outcome.kind()),
            String::new(),
            String::new(),
        ),
        Some(error) => (
            String::new(),
            error.message.clone(),
            error.kind.as_str().to_string(),
        ),
    };

    Record {
        sequence_index: outcome.sequence_index(),
        url: outcome.url().to_string(),
        status: outcome.status().as_str().to_string(),
        attempts: outcome.attempts(),
        timestamp: outcome.timestamp_iso8601(),
        artifact_ref,
        error_message,
        error_kind,
    }
}

/// Success/failure counters; `succeeded + failed == total` always holds
pub fn summary_counts(report: &BatchReport) -> SummaryCounts {
    report.counts
}

/// Write every record of `report` to `sink`, each with a copy of its artifact
///
/// Records are written in `sequence_index` order and the sink is flushed at the end.
/// The report is only borrowed, so it can be delivered again to another sink.
///
/// # Errors
///
/// The first sink failure stops delivery and is returned as [`Error::Sink`](crate::Error::Sink).
pub fn deliver<S>(report: &BatchReport, sink: &mut S) -> Result<SummaryCounts>
where
    S: Sink + ?Sized,
{
    let counts = summary_counts(report);
    let records = to_records(report);

    for (record, outcome) in records.iter().zip(report.outcomes()) {
        if let Err(e) = sink.write(record, outcome.artifact().cloned()) {
            tracing::error!(
                sequence_index = record.sequence_index,
                error = %e,
                "Sink rejected record"
            );
            return Err(e.into());
        }
    }

    sink.flush()?;
    tracing::debug!(records = records.len(), "Delivered batch records");
    Ok(counts)
}

/// Namespace handle for aggregation functions
///
/// Mirrors the free functions of this module for callers that prefer a type path.
pub struct ResultAggregator;

impl ResultAggregator {
    /// See [`collect`]
    pub fn collect<I>(outcomes: I) -> BatchReport
    where
        I: IntoIterator<Item = Outcome>,
    {
        collect(outcomes)
    }

    /// See [`to_records`]
    pub fn to_records(report: &BatchReport) -> Vec<Record> {
        to_records(report)
    }

    /// See [`summary_counts`]
    pub fn summary_counts(report: &BatchReport) -> SummaryCounts {
        summary_counts(report)
    }

    /// See [`deliver`]
    pub fn deliver<S>(report: &BatchReport, sink: &mut S) -> Result<SummaryCounts>
    where
        S: Sink + ?Sized,
    {
        deliver(report, sink)
    }
}
