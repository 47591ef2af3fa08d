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

//! Fathom Core
//!
//! Fundamental types for time-indexed survey stores: element types and
//! their no-data sentinels, typed n-dimensional arrays, incoming chunks,
//! store attributes and configuration.

pub mod array;
pub mod attributes;
pub mod chunk;
pub mod config;
pub mod dataset;
pub mod dtype;
pub mod error;
pub mod resilience;

/// Record timestamp, seconds since epoch
pub type Timestamp = f64;

pub use array::TypedArray;
pub use attributes::{attributes_from_json, AttributeValue, StoreAttributes};
pub use chunk::{IncomingChunk, Variable, PRIMARY_DIM, RAGGED_DIM};
pub use config::{
    BackendConfig, ChunkLayout, ExecutorConfig, ExecutorKind, RetryConfig, StoreConfig,
    WritePolicy, DEFAULT_MAX_PUSH_BAND,
};
pub use dataset::Dataset;
pub use dtype::{DataType, Element};
pub use error::{FathomError, Result};
pub use resilience::RetryPolicy;
