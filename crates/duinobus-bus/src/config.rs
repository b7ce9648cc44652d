use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

/// Default interval at which the reader re-checks whether the bus is open.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default wait for a command response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default depth of the response and event queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Shortest poll interval; `poll(2)` counts in whole milliseconds.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Bus tuning knobs.
///
/// Durations are written in milliseconds when (de)serialized:
///
/// ```json
/// { "poll_interval_ms": 100, "response_timeout_ms": 2000, "queue_capacity": 4, "debug": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Upper bound on how long `close` waits for the reader thread.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Deadline used by `Bus::send_command`.
    #[serde(rename = "response_timeout_ms", with = "millis")]
    pub response_timeout: Duration,
    /// Packets buffered per queue before new arrivals are dropped.
    pub queue_capacity: usize,
    /// Dump every packet sent and received at debug level.
    pub debug: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            debug: false,
        }
    }
}

impl BusConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| BusError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Check that the bus can run with these values.
    ///
    /// A zero-capacity queue would only accept a packet while a caller is
    /// already blocked on it, and a poll interval under a millisecond turns
    /// the reader's wait into a busy loop.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(BusError::InvalidConfig {
                field: "queue_capacity",
                reason: "must be at least 1",
            });
        }
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(BusError::InvalidConfig {
                field: "poll_interval",
                reason: "must be at least 1ms",
            });
        }
        Ok(())
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
