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

//! Commit coordination for one batch of chunks.
//!
//! A batch holds the store lock from the moment it reads the index until
//! its last slice is written, so batches from other handles or processes
//! queue behind it instead of planning against a moving index. The first
//! chunk commits alone, carrying the structural step; only after it returns
//! are the remaining chunks dispatched, either one at a time or all at once.
//! Attributes are merged after the lock is released.

use crate::executor::{CommitExecutor, CommitJob};
use crate::merge::AttributeMerger;
use crate::planner::plan_writes;
use crate::schema::BatchSchema;
use crate::store::ChunkedStore;
use crate::writer::StoreWriter;
use fathom_core::{IncomingChunk, Result, StoreAttributes, Timestamp, WritePolicy};
use fathom_telemetry::commit_span;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub store_path: PathBuf,
    pub final_size: usize,
    pub chunks_written: usize,
    pub pushes_applied: usize,
    pub ragged_expanded_to: Option<usize>,
}

pub struct CommitCoordinator {
    executor: Arc<dyn CommitExecutor>,
    policy: WritePolicy,
    merger: AttributeMerger,
}

impl CommitCoordinator {
    pub fn new(executor: Arc<dyn CommitExecutor>, policy: WritePolicy) -> Self {
        Self {
            executor,
            policy,
            merger: AttributeMerger::default(),
        }
    }

    pub fn with_merger(mut self, merger: AttributeMerger) -> Self {
        self.merger = merger;
        self
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    pub fn merger(&self) -> &AttributeMerger {
        &self.merger
    }

    /// Commit `chunks` to `store` and merge `attributes` afterwards.
    ///
    /// Chunks may arrive in any order; they are sorted by first timestamp.
    /// Nothing is written when planning or schema validation fails. Waits
    /// for the store lock under the store's retry policy.
    pub fn submit(
        &self,
        store: Arc<ChunkedStore>,
        mut chunks: Vec<IncomingChunk>,
        attributes: Option<StoreAttributes>,
    ) -> Result<CommitResult> {
        let started = Instant::now();
        let _span = commit_span!(store.path().display(), chunks = chunks.len()).entered();
        chunks.sort_by(|a, b| a.min_timestamp().total_cmp(&b.min_timestamp()));

        if chunks.is_empty() {
            self.merge_attributes(&store, attributes)?;
            return Ok(CommitResult {
                store_path: store.path().to_path_buf(),
                final_size: store.primary_len()?,
                chunks_written: 0,
                pushes_applied: 0,
                ragged_expanded_to: None,
            });
        }

        let schema = BatchSchema::from_chunks(&chunks, store.ragged_dim())?;
        let lock = store.lock_structure()?;
        schema.validate_against(&store)?;

        let existing = store.primary_index()?;
        let indices: Vec<&[Timestamp]> = chunks.iter().map(|c| c.index()).collect();
        let plan = plan_writes(&existing, &indices)?;
        let placements = plan.placements.clone();
        let writer = Arc::new(StoreWriter::new(store.clone(), plan, schema));
        let chunk_count = chunks.len();

        let mut work = chunks.into_iter().zip(placements);
        let mut first_job: Vec<CommitJob> = Vec::with_capacity(1);
        if let Some((chunk, placement)) = work.next() {
            let writer = writer.clone();
            first_job.push(Box::new(move || {
                writer.commit_first(&chunk, &placement).map(|_| ())
            }));
        }
        for result in self.executor.execute(first_job) {
            result?;
        }
        debug!(store = %store.path().display(), "First chunk committed");

        let rest: Vec<CommitJob> = work
            .map(|(chunk, placement)| {
                let writer = writer.clone();
                Box::new(move || writer.write_chunk(&chunk, &placement)) as CommitJob
            })
            .collect();

        match self.policy {
            WritePolicy::Parallel => {
                let results = self.executor.execute(rest);
                let mut first_error = None;
                for result in results {
                    if let Err(e) = result {
                        first_error.get_or_insert(e);
                    }
                }
                if let Some(e) = first_error {
                    return Err(e);
                }
            }
            WritePolicy::Sequential => {
                for job in rest {
                    for result in self.executor.execute(vec![job]) {
                        result?;
                    }
                }
            }
        }

        drop(lock);
        self.merge_attributes(&store, attributes)?;

        let outcome = writer.structural_outcome().unwrap_or_default();
        info!(
            store = %store.path().display(),
            chunks = chunk_count,
            final_size = outcome.final_size,
            pushes = outcome.pushes_applied,
            executor = self.executor.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Committed batch"
        );

        Ok(CommitResult {
            store_path: store.path().to_path_buf(),
            final_size: outcome.final_size,
            chunks_written: chunk_count,
            pushes_applied: outcome.pushes_applied,
            ragged_expanded_to: outcome.ragged_expanded_to,
        })
    }

    /// Merge `attributes` into the store's attributes under the store lock
    pub fn merge_attributes(
        &self,
        store: &ChunkedStore,
        attributes: Option<StoreAttributes>,
    ) -> Result<()> {
        let Some(attributes) = attributes else {
            return Ok(());
        };
        if attributes.is_empty() {
            return Ok(());
        }
        store.update_attributes(|current| self.merger.merge(current, attributes))?;
        Ok(())
    }
}
