// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for chunked stores and survey backends
//!
//! Everything has a serde default so partial TOML files work; the
//! `FATHOM_*` environment variables override a loaded config.

use crate::chunk::{PRIMARY_DIM, RAGGED_DIM};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default upper bound on records moved per push-forward band
pub const DEFAULT_MAX_PUSH_BAND: usize = 50_000;

/// Default number of attempts for transiently failing I/O
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 200;

/// Default fixed backoff between attempts
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Retry budget for lock contention and transient I/O failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

/// Chunk lengths used when a store creates a new array.
///
/// Dimensions not listed get a single chunk spanning the extent the array
/// is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkLayout {
    /// Chunk length along the primary dimension
    pub primary: usize,
    /// Chunk length for other named dimensions
    pub dims: BTreeMap<String, usize>,
}

impl Default for ChunkLayout {
    fn default() -> Self {
        Self::ping()
    }
}

impl ChunkLayout {
    pub fn ping() -> Self {
        let mut dims = BTreeMap::new();
        dims.insert(RAGGED_DIM.to_string(), 400);
        dims.insert("xyz".to_string(), 3);
        Self {
            primary: 1000,
            dims,
        }
    }

    pub fn navigation() -> Self {
        Self {
            primary: 50_000,
            dims: BTreeMap::new(),
        }
    }

    pub fn attitude() -> Self {
        Self {
            primary: 20_000,
            dims: BTreeMap::new(),
        }
    }

    /// Uniform chunk length on every dimension, mostly for tests
    pub fn uniform(len: usize) -> Self {
        Self {
            primary: len,
            dims: BTreeMap::new(),
        }
        .with_default_dims(len)
    }

    fn with_default_dims(mut self, len: usize) -> Self {
        self.dims.insert(RAGGED_DIM.to_string(), len);
        self
    }

    /// Chunk shape for an array with `dims` created at `shape`
    pub fn chunk_shape(&self, primary_dim: &str, dims: &[String], shape: &[usize]) -> Vec<usize> {
        dims.iter()
            .zip(shape)
            .map(|(dim, extent)| {
                let len = if dim == primary_dim {
                    self.primary
                } else {
                    self.dims.get(dim).copied().unwrap_or(*extent)
                };
                len.max(1)
            })
            .collect()
    }
}

/// Settings for one chunked store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Record dimension every time-series array spans
    pub primary_dim: String,

    /// Dimension whose extent may grow between batches
    pub ragged_dim: Option<String>,

    /// Upper bound on records moved per push-forward band
    pub max_push_band: usize,

    pub retry: RetryConfig,

    pub layout: ChunkLayout,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            primary_dim: PRIMARY_DIM.to_string(),
            ragged_dim: Some(RAGGED_DIM.to_string()),
            max_push_band: DEFAULT_MAX_PUSH_BAND,
            retry: RetryConfig::default(),
            layout: ChunkLayout::default(),
        }
    }
}

impl StoreConfig {
    /// Small chunks, tiny bands and a short retry budget
    pub fn for_testing() -> Self {
        Self {
            max_push_band: 7,
            retry: RetryConfig {
                max_attempts: 50,
                backoff_ms: 2,
            },
            layout: ChunkLayout::uniform(4),
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: ChunkLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Whether a batch's remaining chunks commit one at a time or all at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    Sequential,
    #[default]
    Parallel,
}

/// Where commit work runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// On the calling thread
    Local,
    /// On a fixed pool of worker threads
    #[default]
    ThreadPool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,
    /// Worker threads for the pool; 0 means one per available core
    pub workers: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::ThreadPool,
            workers: 0,
        }
    }
}

/// Configuration of a survey backend writing into one output folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Folder holding one store per dataset
    pub output_folder: PathBuf,

    pub write_policy: WritePolicy,

    pub executor: ExecutorConfig,

    pub retry: RetryConfig,

    pub max_push_band: usize,

    pub ping_layout: ChunkLayout,
    pub navigation_layout: ChunkLayout,
    pub attitude_layout: ChunkLayout,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from("."),
            write_policy: WritePolicy::default(),
            executor: ExecutorConfig::default(),
            retry: RetryConfig::default(),
            max_push_band: DEFAULT_MAX_PUSH_BAND,
            ping_layout: ChunkLayout::ping(),
            navigation_layout: ChunkLayout::navigation(),
            attitude_layout: ChunkLayout::attitude(),
        }
    }
}

impl BackendConfig {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment overrides
    ///
    /// Supported environment variables:
    /// - FATHOM_OUTPUT_FOLDER: folder holding the dataset stores
    /// - FATHOM_WRITE_POLICY: `sequential` or `parallel`
    /// - FATHOM_WORKERS: worker threads for the commit pool
    /// - FATHOM_RETRY_ATTEMPTS: attempts for transient failures
    /// - FATHOM_RETRY_BACKOFF_MS: backoff between attempts
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(folder) = std::env::var("FATHOM_OUTPUT_FOLDER") {
            self.output_folder = PathBuf::from(folder);
        }

        if let Ok(policy) = std::env::var("FATHOM_WRITE_POLICY") {
            match policy.to_ascii_lowercase().as_str() {
                "sequential" => self.write_policy = WritePolicy::Sequential,
                "parallel" => self.write_policy = WritePolicy::Parallel,
                other => tracing::warn!(value = other, "Ignoring unknown FATHOM_WRITE_POLICY"),
            }
        }

        if let Ok(workers) = std::env::var("FATHOM_WORKERS") {
            if let Ok(val) = workers.parse() {
                self.executor.workers = val;
            }
        }

        if let Ok(attempts) = std::env::var("FATHOM_RETRY_ATTEMPTS") {
            if let Ok(val) = attempts.parse() {
                self.retry.max_attempts = val;
            }
        }

        if let Ok(backoff) = std::env::var("FATHOM_RETRY_BACKOFF_MS") {
            if let Ok(val) = backoff.parse() {
                self.retry.backoff_ms = val;
            }
        }

        self
    }

    /// Store settings for `dataset`
    pub fn store_config(&self, dataset: &Dataset) -> StoreConfig {
        let layout = match dataset {
            Dataset::Ping { .. } => self.ping_layout.clone(),
            Dataset::Navigation | Dataset::PostProcessedNavigation => {
                self.navigation_layout.clone()
            }
            Dataset::Attitude => self.attitude_layout.clone(),
        };
        StoreConfig {
            max_push_band: self.max_push_band,
            retry: self.retry.clone(),
            layout,
            ..StoreConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_store_config() {
        let config = StoreConfig::default();
        assert_eq!(config.primary_dim, "time");
        assert_eq!(config.ragged_dim.as_deref(), Some("beam"));
        assert_eq!(config.max_push_band, 50_000);
        assert_eq!(config.retry.max_attempts, 200);
        assert_eq!(config.retry.backoff_ms, 100);
    }

    #[test]
    fn test_chunk_shape_from_layout() {
        let layout = ChunkLayout::ping();
        let dims = vec!["time".to_string(), "beam".to_string()];
        assert_eq!(layout.chunk_shape("time", &dims, &[10, 512]), vec![1000, 400]);

        let dims = vec!["time".to_string(), "sensor".to_string()];
        assert_eq!(layout.chunk_shape("time", &dims, &[10, 6]), vec![1000, 6]);

        // zero-extent dimension still gets a usable chunk length
        assert_eq!(layout.chunk_shape("time", &dims, &[0, 0]), vec![1000, 1]);
    }

    #[test]
    fn test_partial_toml() {
        let config = BackendConfig::from_toml_str(
            r#"
            output_folder = "/survey/em2040"
            write_policy = "sequential"

            [executor]
            kind = "local"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.output_folder, PathBuf::from("/survey/em2040"));
        assert_eq!(config.write_policy, WritePolicy::Sequential);
        assert_eq!(config.executor.kind, ExecutorKind::Local);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_ms, 100);
        assert_eq!(config.ping_layout, ChunkLayout::ping());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = BackendConfig::from_toml_str("write_policy = 3").unwrap_err();
        assert!(matches!(err, crate::FathomError::Config(_)));
    }

    #[test]
    fn test_store_config_per_dataset() {
        let config = BackendConfig::new("/tmp/out");
        let nav = config.store_config(&Dataset::Navigation);
        assert_eq!(nav.layout.primary, 50_000);
        let att = config.store_config(&Dataset::Attitude);
        assert_eq!(att.layout.primary, 20_000);
        let ping = config.store_config(&Dataset::Ping {
            system_id: "123".into(),
        });
        assert_eq!(ping.layout.primary, 1000);
    }
}
