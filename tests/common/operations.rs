//! Fake rendering operations for integration tests

use async_trait::async_trait;
use render_batch::{Artifact, ErrorRecord, OperationParams, RenderingOperation};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Build `n` distinct URLs
pub fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://example.com/page/{i}")).collect()
}

/// Artifact returned by the fakes on success
pub fn artifact_for(url: &str, params: &OperationParams) -> Artifact {
    Artifact::Text {
        kind: params.kind,
        text: format!("rendered {url}"),
    }
}

/// Operation whose results are scripted per URL
///
/// Each URL consumes its script front to back; once the script is empty every further
/// call succeeds.
#[derive(Default)]
pub struct ScriptedOperation {
    scripts: Mutex<HashMap<String, Vec<ErrorRecord>>>,
    calls: Mutex<HashMap<String, u32>>,
    latency: Duration,
}

impl ScriptedOperation {
    /// Operation that always succeeds immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` first
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next calls for `url` with `errors`, in order
    pub fn fail(self, url: impl Into<String>, errors: Vec<ErrorRecord>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.into(), errors.into_iter().rev().collect());
        self
    }

    /// Calls made for `url`
    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Calls made for every URL
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl RenderingOperation for ScriptedOperation {
    async fn render(&self, url: &str, params: &OperationParams) -> Result<Artifact, ErrorRecord> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|script| script.pop());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match scripted {
            Some(error) => Err(error),
            None => Ok(artifact_for(url, params)),
        }
    }
}

/// Wrapper counting how many calls to the inner operation are in flight
pub struct InstrumentedOperation<O> {
    inner: O,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl<O> InstrumentedOperation<O> {
    /// Wrap `inner`
    pub fn new(inner: O) -> Arc<Self> {
        Arc::new(Self {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Highest number of simultaneous calls observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Calls currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<O: RenderingOperation> RenderingOperation for InstrumentedOperation<O> {
    async fn render(&self, url: &str, params: &OperationParams) -> Result<Artifact, ErrorRecord> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.inner.render(url, params).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
