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

//! Applies a write plan to a store.
//!
//! The first chunk of a batch runs the structural step: ragged expansion,
//! creation of missing arrays, resize of the primary dimension and
//! push-forward. Every later chunk only writes its slices, so those commits
//! can run concurrently once the first returns.
//!
//! The writer does not lock. Its caller holds the store lock for the whole
//! batch; see [`crate::coordinator`].

use crate::planner::{Placement, WritePlan};
use crate::schema::BatchSchema;
use crate::store::ChunkedStore;
use fathom_core::{FathomError, IncomingChunk, Result};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// What the structural step of a batch changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralOutcome {
    pub final_size: usize,
    pub ragged_expanded_to: Option<usize>,
    pub arrays_created: Vec<String>,
    pub pushes_applied: usize,
}

pub struct StoreWriter {
    store: Arc<ChunkedStore>,
    plan: WritePlan,
    schema: BatchSchema,
    structural: Mutex<Option<StructuralOutcome>>,
}

impl StoreWriter {
    pub fn new(store: Arc<ChunkedStore>, plan: WritePlan, schema: BatchSchema) -> Self {
        Self {
            store,
            plan,
            schema,
            structural: Mutex::new(None),
        }
    }

    pub fn plan(&self) -> &WritePlan {
        &self.plan
    }

    pub fn structural_outcome(&self) -> Option<StructuralOutcome> {
        self.structural.lock().clone()
    }

    /// Structural step followed by the slices of the batch's first chunk
    pub fn commit_first(
        &self,
        chunk: &IncomingChunk,
        placement: &Placement,
    ) -> Result<StructuralOutcome> {
        let outcome = self.apply_structural()?;
        self.write_chunk(chunk, placement)?;
        Ok(outcome)
    }

    /// Run the structural step; a second call for the same batch fails
    pub fn apply_structural(&self) -> Result<StructuralOutcome> {
        let mut slot = self.structural.lock();
        if slot.is_some() {
            return Err(FathomError::StructuralMutationRepeated);
        }
        let outcome = self.structural_step()?;
        *slot = Some(outcome.clone());
        Ok(outcome)
    }

    fn structural_step(&self) -> Result<StructuralOutcome> {
        let store = &self.store;
        let primary = store.primary_dim().to_string();
        let ragged = store.ragged_dim().map(str::to_string);

        let actual = store.primary_len()?;
        if actual != self.plan.existing_len {
            return Err(FathomError::StalePlan {
                planned: self.plan.existing_len,
                actual,
            });
        }

        let mut outcome = StructuralOutcome {
            final_size: self.plan.final_size,
            ..Default::default()
        };

        // record arrays present before this batch get resized and pushed
        let mut existing_record_arrays = Vec::new();
        for name in store.array_names()? {
            if store.array_meta(&name)?.axis_of(&primary).is_some() {
                existing_record_arrays.push(name);
            }
        }

        let mut ragged_extent = None;
        if let Some(ragged) = ragged.as_deref() {
            let current = store.dimension_extent(ragged)?;
            let target = self.schema.ragged_extent;
            if let (Some(current), Some(target)) = (current, target) {
                if target > current {
                    store.expand_ragged_dimension(target)?;
                    outcome.ragged_expanded_to = Some(target);
                }
            }
            ragged_extent = match (current, target) {
                (Some(c), Some(t)) => Some(c.max(t)),
                (c, t) => c.or(t),
            };
        }

        for (name, variable) in &self.schema.variables {
            if store.has_array(name) {
                continue;
            }
            let shape = self
                .schema
                .creation_shape(name, self.plan.final_size, ragged.as_deref(), ragged_extent)
                .unwrap_or_default();
            store.create_array(name, variable.data_type, &variable.dims, &shape)?;
            outcome.arrays_created.push(name.clone());

            if let Some(values) = self.schema.static_values.get(name) {
                if ragged.as_deref() == Some(name.as_str()) && variable.dims.len() == 1 {
                    store.regenerate_coordinate(name, variable.data_type, shape[0])?;
                } else {
                    let mut data = values.data.clone();
                    for (axis, &len) in shape.iter().enumerate() {
                        data = data.pad_axis(axis, len);
                    }
                    store.write_region(name, &vec![0; shape.len()], &data)?;
                }
            }
        }

        for name in &existing_record_arrays {
            store.resize_dimension(name, &primary, self.plan.final_size)?;
        }

        if !self.plan.push_forward.is_empty() {
            for name in &existing_record_arrays {
                self.push_forward(name)?;
            }
        }
        outcome.pushes_applied = self.plan.push_forward.len();

        info!(
            store = %store.path().display(),
            existing = self.plan.existing_len,
            final_size = self.plan.final_size,
            pushes = outcome.pushes_applied,
            created = outcome.arrays_created.len(),
            ragged_expanded_to = ?outcome.ragged_expanded_to,
            "Applied structural step"
        );
        Ok(outcome)
    }

    /// Apply every push of the plan to `name`, in order
    fn push_forward(&self, name: &str) -> Result<()> {
        let mut logical_end = self.plan.existing_len;
        for push in &self.plan.push_forward {
            let point = push.insertion_point;
            self.shift_forward(name, point..logical_end, push.count)?;
            self.store.fill_no_data(name, point..point + push.count)?;
            logical_end += push.count;
        }
        Ok(())
    }

    /// Move `span` of the primary axis `count` records towards the end,
    /// in bands of at most `max_push_band` records, highest band first
    fn shift_forward(&self, name: &str, span: Range<usize>, count: usize) -> Result<()> {
        if span.is_empty() || count == 0 {
            return Ok(());
        }
        let meta = self.store.array_meta(name)?;
        let Some(axis) = meta.axis_of(self.store.primary_dim()) else {
            return Ok(());
        };
        let band = self.store.config().max_push_band.max(1);

        let mut band_end = span.end;
        while band_end > span.start {
            let band_start = band_end.saturating_sub(band).max(span.start);
            let mut region = meta.full_region();
            region[axis] = band_start..band_end;
            let values = self.store.read_region(name, &region)?;

            let mut origin = vec![0; meta.ndim()];
            origin[axis] = band_start + count;
            self.store.write_region(name, &origin, &values)?;
            trace!(array = name, band_start, band_end, count, "Pushed band forward");
            band_end = band_start;
        }
        debug!(array = name, from = span.start, moved = span.len(), count, "Pushed records forward");
        Ok(())
    }

    /// Write the slices of one chunk. The index goes last so a crash
    /// mid-chunk leaves the rows marked unwritten.
    pub fn write_chunk(&self, chunk: &IncomingChunk, placement: &Placement) -> Result<()> {
        if self.structural.lock().is_none() {
            return Err(FathomError::planning(
                "chunk slices written before the batch's structural step",
            ));
        }

        for (name, variable) in chunk.variables() {
            if !chunk.is_record_variable(variable) {
                continue;
            }
            let meta = self.store.array_meta(name)?;
            if meta.dimension_names != variable.dims {
                return Err(FathomError::shape_mismatch(
                    name,
                    format!("{:?}", meta.dimension_names),
                    format!("{:?}", variable.dims),
                ));
            }
            self.store.write_slice(name, placement, &variable.data)?;
        }

        let index = chunk.index_variable();
        self.store
            .write_slice(chunk.primary_dim(), placement, &index.data)?;

        trace!(
            records = chunk.len(),
            first = chunk.min_timestamp(),
            last = chunk.max_timestamp(),
            "Committed chunk"
        );
        Ok(())
    }
}
