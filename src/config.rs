//! Configuration types for render-batch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Batch runner configuration
///
/// Serializes with millisecond integers for every delay, e.g.
///
/// ```json
/// { "concurrency": 4, "max_attempts": 3, "base_delay_ms": 500, "inter_item_delay_ms": 250 }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of concurrent workers (default: 3, must be >= 1)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Total attempts per item, including the first (default: 1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff (default: 1000ms)
    #[serde(
        default = "default_base_delay",
        rename = "base_delay_ms",
        with = "millis_serde"
    )]
    pub base_delay: Duration,

    /// Pause each worker takes after finishing an item (default: 0)
    #[serde(default, rename = "inter_item_delay_ms", with = "millis_serde")]
    pub inter_item_delay: Duration,

    /// Cap on the exponential part of a retry delay (None = uncapped)
    #[serde(
        default,
        rename = "max_delay_ms",
        with = "optional_millis_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_delay: Option<Duration>,

    /// Add up to one second of random jitter to retry delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Cooperative cancellation signal
    ///
    /// Once cancelled, workers finish their in-flight call and stop claiming items.
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            inter_item_delay: Duration::ZERO,
            max_delay: None,
            jitter: true,
            cancellation: None,
        }
    }
}

impl RunnerConfig {
    /// Parse a JSON document, filling missing fields with defaults, and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Check that the configuration can drive a batch
    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(Error::config(
                "concurrency",
                format!("concurrency must be at least 1, got {}", self.concurrency),
            ));
        }
        if self.max_attempts < 1 {
            return Err(Error::config(
                "max_attempts",
                "max_attempts must be at least 1 (1 = no retry)",
            ));
        }
        Ok(())
    }
}

fn default_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
