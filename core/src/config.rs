//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Certificate-verification bypass is not configurable here; it is the
//! `insecure-skip-verify` cargo feature.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Chunk size used when pushing a streamed body into its pipe.
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Matches the slot count of the network service this transport serves.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub stream_chunk_size: usize,
    /// Chunks the body pipe holds before the producer sees would-block.
    pub stream_channel_capacity: usize,
    /// `None` waits for a blocked consumer forever.
    pub backpressure_timeout_ms: Option<u64>,
    /// Bytes reserved in the read buffer before each socket read.
    pub read_buffer_size: usize,
    /// Upper bound on status line plus header block.
    pub max_head_bytes: usize,
    /// Upper bound on a buffered-mode body. `None` is unbounded.
    pub max_buffered_body_bytes: Option<usize>,
    pub max_redirects: usize,
    pub max_concurrent_loads: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stream_chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            stream_channel_capacity: 16,
            backpressure_timeout_ms: None,
            read_buffer_size: 8 * 1024,
            max_head_bytes: 256 * 1024,
            max_buffered_body_bytes: None,
            max_redirects: 20,
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
        }
    }
}

impl TransportConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn backpressure_timeout(&self) -> Option<Duration> {
        self.backpressure_timeout_ms.map(Duration::from_millis)
    }
}
