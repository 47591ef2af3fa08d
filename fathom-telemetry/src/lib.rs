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

//! Fathom logging setup.
//!
//! Libraries in this workspace only emit `tracing` events and never install
//! a subscriber. [`init_logging`] is for downstream binaries and
//! long-running ingest jobs, which call it once at startup; the storage
//! benchmarks use it the same way. [`commit_span!`] wraps each committed
//! batch.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[doc(hidden)]
pub use tracing;

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human-readable, for terminals
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,

    /// Filter used when `RUST_LOG` is unset
    pub default_directive: String,

    pub with_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_directive: "info,fathom_storage=info".to_string(),
            with_thread_ids: true,
        }
    }
}

impl LogConfig {
    pub fn pretty() -> Self {
        Self {
            format: LogFormat::Pretty,
            with_thread_ids: false,
            ..Self::default()
        }
    }

    /// The env filter: `RUST_LOG` if set, otherwise `default_directive`
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(&self.default_directive)?),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(config.with_thread_ids)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(config.with_thread_ids),
            )
            .try_init()?,
    }

    tracing::debug!(format = ?config.format, "Logging initialized");
    Ok(())
}

/// Span covering one batch commit to a store
#[macro_export]
macro_rules! commit_span {
    ($store:expr, $($field:tt)*) => {
        $crate::tracing::info_span!("commit", store = %$store, $($field)*)
    };
}
