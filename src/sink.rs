//! Destinations for aggregated records
//!
//! The aggregator hands each [`Record`] to a [`Sink`] together with an owned copy of the
//! item's artifact. Storage strategy (disk layout, object stores, downloads) is the sink's
//! business; callers pick an implementation explicitly.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::SinkError;
use crate::types::{Artifact, Record};

/// Persistence of aggregated records
///
/// Failures are not retried; they abort delivery and surface as
/// [`Error::Sink`](crate::Error::Sink).
pub trait Sink {
    /// Persist one record; `artifact` is present for successful items only
    fn write(&mut self, record: &Record, artifact: Option<Artifact>) -> Result<(), SinkError>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write(&mut self, record: &Record, artifact: Option<Artifact>) -> Result<(), SinkError> {
        (**self).write(record, artifact)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Keeps records and artifacts in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Records in the order they were written
    pub records: Vec<Record>,
    /// Artifacts keyed by `Record::artifact_ref`
    pub artifacts: Vec<(String, Artifact)>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact stored under `artifact_ref`
    pub fn artifact(&self, artifact_ref: &str) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|(name, _)| name == artifact_ref)
            .map(|(_, artifact)| artifact)
    }
}

impl Sink for MemorySink {
    fn write(&mut self, record: &Record, artifact: Option<Artifact>) -> Result<(), SinkError> {
        if let Some(artifact) = artifact {
            self.artifacts.push((record.artifact_ref.clone(), artifact));
        }
        self.records.push(record.clone());
        Ok(())
    }
}

/// Writes one JSON object per record, one per line
///
/// Artifacts are dropped; only the record rows are written.
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> JsonLinesSink<W> {
    /// Sink writing to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl JsonLinesSink<File> {
    /// Create (or truncate) a results file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn write(&mut self, record: &Record, _artifact: Option<Artifact>) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
