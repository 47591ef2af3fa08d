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

//! Fathom Storage Layer
//!
//! Chunked, time-indexed array stores for survey data.
//!
//! ## Architecture
//!
//! - **Planner**: places each incoming chunk against the stored index and
//!   derives the push-forward shifts that keep the index sorted
//! - **Chunked store**: a zarr hierarchy (via `zarrs`) with one array per
//!   variable, advisory file locks around every write
//! - **Commit coordinator**: holds the store lock for a whole batch,
//!   commits its first chunk alone and the rest in parallel or in sequence
//! - **Attribute merger**: folds incoming store attributes into the stored ones
//! - **Survey backend**: maps datasets to stores under an output folder
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fathom_core::{BackendConfig, Dataset};
//! use fathom_storage::SurveyBackend;
//!
//! let backend = SurveyBackend::new(BackendConfig::new("/data/survey"))?;
//! backend.submit_chunks(&Dataset::Navigation, chunks, None)?;
//! let depth = backend.read_all(&Dataset::Navigation, "altitude")?;
//! ```

pub mod backend;
pub mod coordinator;
pub mod executor;
pub mod lock;
pub mod merge;
pub mod meta;
pub mod planner;
pub mod schema;
pub mod store;
pub mod writer;

pub use backend::SurveyBackend;
pub use coordinator::{CommitCoordinator, CommitResult};
pub use executor::{
    executor_from_config, CommitExecutor, CommitJob, LocalExecutor, ThreadPoolExecutor,
};
pub use lock::LockGuard;
pub use merge::{AttributeKind, AttributeMerger, MergeRules, PrefixedCollection};
pub use meta::{ArrayMeta, StoreMeta};
pub use planner::{plan_writes, Placement, PushForward, WritePlan};
pub use schema::{BatchSchema, VariableSchema};
pub use store::ChunkedStore;
pub use writer::{StoreWriter, StructuralOutcome};

use fathom_core::{IncomingChunk, Result, StoreAttributes, StoreConfig, TypedArray, WritePolicy};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// Commit `chunks` to the store at `store_path` on the calling thread,
/// creating the store if it does not exist.
pub fn submit_chunks(
    store_path: impl AsRef<Path>,
    chunks: Vec<IncomingChunk>,
    attributes: Option<StoreAttributes>,
    config: StoreConfig,
) -> Result<CommitResult> {
    let store = Arc::new(ChunkedStore::create_or_open(store_path, config)?);
    CommitCoordinator::new(Arc::new(LocalExecutor), WritePolicy::Sequential).submit(
        store,
        chunks,
        attributes,
    )
}

/// Read records `range` of `array` from the store at `store_path`
pub fn read(
    store_path: impl AsRef<Path>,
    array: &str,
    range: Range<usize>,
    config: StoreConfig,
) -> Result<TypedArray> {
    ChunkedStore::open(store_path, config)?.read(array, range)
}
