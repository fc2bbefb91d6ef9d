//! Bounded-concurrency batch execution
//!
//! [`BatchRunner::run`] spawns `concurrency` workers over a shared [`Drain`]. Each worker
//! claims an item, drives it through [`retry_in_place`], sends exactly one [`Outcome`] over
//! an mpsc channel, optionally pauses for the inter-item delay, and claims again until the
//! queue is exhausted or the cancellation token is raised. The collected outcomes are
//! sorted into a [`BatchReport`] once every worker has stopped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::aggregator;
use crate::config::RunnerConfig;
use crate::error::{ErrorRecord, Result};
use crate::operation::RenderingOperation;
use crate::queue::{Drain, JobQueue};
use crate::retry::{RetryPolicy, retry_in_place};
use crate::types::{BatchReport, Event, OperationParams, Outcome, WorkItem};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Runs batches of work items against one rendering operation
pub struct BatchRunner {
    operation: Arc<dyn RenderingOperation>,
    config: RunnerConfig,
    event_tx: broadcast::Sender<Event>,
}

impl BatchRunner {
    /// Runner for `operation` with `config`
    ///
    /// The configuration is validated when a batch starts.
    pub fn new(operation: Arc<dyn RenderingOperation>, config: RunnerConfig) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            operation,
            config,
            event_tx,
        }
    }

    /// Receive progress events of subsequent runs
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Queue `urls` with shared `params` and run them
    pub async fn run_urls<I, S>(&self, urls: I, params: &OperationParams) -> Result<BatchReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run(JobQueue::from_urls(urls, params)).await
    }

    /// Execute every item of `queue`, producing exactly one outcome per claimed item
    ///
    /// # Errors
    ///
    /// Only an invalid configuration fails the call, before any work starts. Rendering
    /// failures are recorded in the report.
    pub async fn run(&self, queue: JobQueue) -> Result<BatchReport> {
        self.config.validate()?;

        let total = queue.len();
        let cancel = self.config.cancellation.clone().unwrap_or_default();
        let worker_count = self.config.concurrency.min(total);
        let start = Instant::now();

        tracing::info!(
            total,
            concurrency = self.config.concurrency,
            max_attempts = self.config.max_attempts,
            "Starting batch"
        );
        self.event_tx
            .send(Event::BatchStarted {
                total,
                concurrency: worker_count,
            })
            .ok();

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let ctx = WorkerContext {
            drain: queue.drain(),
            operation: Arc::clone(&self.operation),
            policy: RetryPolicy::from_config(&self.config),
            inter_item_delay: self.config.inter_item_delay,
            cancel: cancel.clone(),
            event_tx: self.event_tx.clone(),
            outcome_tx,
        };

        let handles: Vec<_> = (0..worker_count)
            .map(|worker_id| tokio::spawn(run_worker(worker_id, ctx.clone())))
            .collect();
        // Workers hold the remaining senders; the channel closes when the last one exits.
        drop(ctx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = outcome_rx.recv().await {
            outcomes.push(outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Batch worker terminated abnormally");
            }
        }

        let report = aggregator::collect_run(outcomes, cancel.is_cancelled(), start.elapsed());

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            total = report.total(),
            cancelled = report.cancelled(),
            elapsed_ms = report.elapsed().as_millis() as u64,
            "Batch finished"
        );
        self.event_tx
            .send(Event::BatchCompleted {
                succeeded: report.succeeded(),
                failed: report.failed(),
                total: report.total(),
                cancelled: report.cancelled(),
            })
            .ok();

        Ok(report)
    }
}

/// Run `urls` through `operation` with `config`
///
/// Convenience entry point for callers that do not need progress events.
pub async fn run<I, S>(
    urls: I,
    params: &OperationParams,
    operation: Arc<dyn RenderingOperation>,
    config: RunnerConfig,
) -> Result<BatchReport>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    BatchRunner::new(operation, config)
        .run_urls(urls, params)
        .await
}

/// State shared by every worker of one run
#[derive(Clone)]
struct WorkerContext {
    drain: Drain,
    operation: Arc<dyn RenderingOperation>,
    policy: RetryPolicy,
    inter_item_delay: Duration,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<Event>,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
}

async fn run_worker(worker_id: usize, ctx: WorkerContext) {
    loop {
        if ctx.cancel.is_cancelled() {
            tracing::debug!(worker_id, "Cancellation raised, worker stops claiming");
            break;
        }

        let Some(item) = ctx.drain.claim() else {
            break;
        };

        tracing::debug!(
            worker_id,
            sequence_index = item.sequence_index(),
            url = item.url(),
            "Claimed item"
        );
        ctx.event_tx
            .send(Event::ItemStarted {
                sequence_index: item.sequence_index(),
                url: item.url().to_string(),
            })
            .ok();

        let outcome = process_item(&ctx, &item).await;

        ctx.event_tx
            .send(Event::ItemCompleted {
                sequence_index: outcome.sequence_index(),
                status: outcome.status(),
                attempts: outcome.attempts(),
                error_kind: outcome.error().map(|e| e.kind),
            })
            .ok();

        if ctx.outcome_tx.send(outcome).is_err() {
            tracing::error!(
                worker_id,
                sequence_index = item.sequence_index(),
                "Outcome receiver dropped"
            );
            break;
        }

        // No pause after the last item; nothing is left to pace.
        if !ctx.inter_item_delay.is_zero() && ctx.drain.remaining() > 0 {
            tokio::select! {
                _ = tokio::time::sleep(ctx.inter_item_delay) => {}
                _ = ctx.cancel.cancelled() => {}
            }
        }
    }

    tracing::debug!(worker_id, "Worker finished");
}

/// Drive one item to its terminal outcome
async fn process_item(ctx: &WorkerContext, item: &WorkItem) -> Outcome {
    let operation = &*ctx.operation;
    let sequence_index = item.sequence_index();

    let (result, attempts) = retry_in_place(
        &ctx.policy,
        Some(&ctx.cancel),
        |attempt, delay, error: &ErrorRecord| {
            ctx.event_tx
                .send(Event::ItemRetrying {
                    sequence_index,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: error.message.clone(),
                })
                .ok();
        },
        move || async move {
            AssertUnwindSafe(operation.render(item.url(), item.params()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ErrorRecord::permanent(format!(
                        "rendering operation panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                })
        },
    )
    .await;

    match &result {
        Ok(artifact) => tracing::debug!(
            sequence_index,
            attempts,
            bytes = artifact.len(),
            "Item succeeded"
        ),
        Err(error) => tracing::error!(
            sequence_index,
            url = item.url(),
            attempts,
            kind = %error.kind,
            error = %error.message,
            "Item failed"
        ),
    }

    Outcome::new(item, attempts, result)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
