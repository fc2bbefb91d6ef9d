//! # render-batch
//!
//! Client-side batch execution over a remote browser-rendering service.
//!
//! Given a list of URLs and a rendering operation (screenshot, PDF, content or Markdown
//! extraction), render-batch applies the operation to every URL with bounded concurrency,
//! retries transient failures with jittered exponential backoff, isolates per-item
//! failures, and aggregates one ordered [`Outcome`] per URL into a [`BatchReport`].
//!
//! ## Design Philosophy
//!
//! - **Library-first** - the remote protocol and storage are injected collaborators
//!   ([`RenderingOperation`], [`Sink`]), not built in
//! - **Total accounting** - every claimed URL ends in exactly one outcome
//! - **Event-driven** - consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use render_batch::{
//!     Artifact, BatchRunner, ErrorRecord, FnOperation, JsonLinesSink, OperationKind,
//!     OperationParams, RunnerConfig, aggregator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let operation = Arc::new(FnOperation::new(|url: String, params: OperationParams| async move {
//!         // Call the remote rendering service here
//!         Ok::<_, ErrorRecord>(Artifact::Text { kind: params.kind, text: url })
//!     }));
//!
//!     let config = RunnerConfig {
//!         concurrency: 4,
//!         max_attempts: 3,
//!         ..Default::default()
//!     };
//!     let runner = BatchRunner::new(operation, config);
//!
//!     let urls = ["https://example.com", "https://example.org"];
//!     let report = runner
//!         .run_urls(urls, &OperationParams::new(OperationKind::Markdown))
//!         .await?;
//!
//!     let mut sink = JsonLinesSink::create("results.jsonl")?;
//!     let counts = aggregator::deliver(&report, &mut sink)?;
//!     println!("{} succeeded, {} failed", counts.succeeded, counts.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Outcome aggregation, records and sink delivery
pub mod aggregator;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Rendering operation contract
pub mod operation;
/// Job queue with atomic claims
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Bounded-concurrency batch runner
pub mod runner;
/// Record sinks
pub mod sink;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use aggregator::ResultAggregator;
pub use config::RunnerConfig;
pub use error::{Error, ErrorKind, ErrorRecord, Result, SinkError};
pub use operation::{FnOperation, RenderingOperation};
pub use queue::{Drain, JobQueue};
pub use retry::{IsRetryable, RetryPolicy};
pub use runner::{BatchRunner, run};
pub use sink::{JsonLinesSink, MemorySink, Sink};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    Artifact, BatchReport, Event, OperationKind, OperationParams, Outcome, OutcomeStatus,
    Record, SummaryCounts, WorkItem,
};

/// Cancel `token` when the process receives a termination signal.
///
/// Spawns a task that waits for the signal; workers then finish their in-flight call and
/// stop claiming new items, and the report comes back with `cancelled == true`.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use render_batch::{CancellationToken, RunnerConfig, cancel_on_shutdown_signal};
///
/// # #[tokio::main]
/// # async fn main() {
/// let token = CancellationToken::new();
/// cancel_on_shutdown_signal(token.clone());
/// let config = RunnerConfig::default().with_cancellation(token);
/// # }
/// ```
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_signal() => {
                tracing::info!(signal, "Cancelling batch: in-flight items finish, no new claims");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Name of the first termination signal received
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn listen(kind: SignalKind, name: &'static str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| {
                tracing::warn!(signal = name, error = %e, "Batch cancellation will not react to signal");
            })
            .ok()
    }

    // A missing or closed stream never fires
    async fn next(stream: &mut Option<Signal>) {
        let received = match stream {
            Some(stream) => stream.recv().await.is_some(),
            None => false,
        };
        if !received {
            std::future::pending::<()>().await;
        }
    }

    let mut sigterm = listen(SignalKind::terminate(), "SIGTERM");
    let mut sigint = listen(SignalKind::interrupt(), "SIGINT");
    if sigterm.is_none() && sigint.is_none() {
        return ctrl_c_or_never().await;
    }

    tokio::select! {
        _ = next(&mut sigterm) => "SIGTERM",
        _ = next(&mut sigint) => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c_or_never().await
}

/// Wait for Ctrl+C; if it cannot be observed, never resolve so the batch is not cancelled
async fn ctrl_c_or_never() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "No shutdown signal available, batch cancellation is token-only");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_task_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = cancel_on_shutdown_signal(token.clone());

        token.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("signal task should stop once the token is cancelled")
            .unwrap();
    }

    #[tokio::test]
    async fn no_signal_means_no_cancellation() {
        let token = CancellationToken::new();
        let handle = cancel_on_shutdown_signal(token.clone());

        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), wait_for_signal()).await;

        assert!(waited.is_err(), "signal wait resolved without a signal");
        assert!(!token.is_cancelled());
        handle.abort();
    }
}
