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

//! Batch schema: the arrays a batch touches, checked before any I/O

use crate::store::ChunkedStore;
use fathom_core::{DataType, FathomError, IncomingChunk, Result, Variable};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSchema {
    pub data_type: DataType,
    pub dims: Vec<String>,
    /// Largest extent seen per axis; the primary axis is left at zero
    pub extents: Vec<usize>,
}

/// Union of the variables of every chunk in a batch
#[derive(Debug, Clone, Default)]
pub struct BatchSchema {
    pub primary_dim: String,
    pub variables: BTreeMap<String, VariableSchema>,
    /// Variables without the primary dimension, from their first chunk
    pub static_values: BTreeMap<String, Variable>,
    /// Widest ragged extent in the batch
    pub ragged_extent: Option<usize>,
}

impl BatchSchema {
    pub fn from_chunks(chunks: &[IncomingChunk], ragged_dim: Option<&str>) -> Result<Self> {
        let primary_dim = chunks
            .first()
            .map(|c| c.primary_dim().to_string())
            .unwrap_or_default();
        let mut schema = BatchSchema {
            primary_dim: primary_dim.clone(),
            ..Default::default()
        };

        for chunk in chunks {
            if chunk.primary_dim() != primary_dim {
                return Err(FathomError::invalid_chunk(format!(
                    "batch mixes primary dimensions '{}' and '{}'",
                    primary_dim,
                    chunk.primary_dim()
                )));
            }
            schema.add_named(chunk.primary_dim(), &chunk.index_variable(), ragged_dim)?;
            for (name, variable) in chunk.variables() {
                schema.add_named(name, variable, ragged_dim)?;
                if !chunk.is_record_variable(variable) && !schema.static_values.contains_key(name) {
                    schema.static_values.insert(name.clone(), variable.clone());
                }
            }
        }
        Ok(schema)
    }

    fn add_named(
        &mut self,
        name: &str,
        variable: &Variable,
        ragged_dim: Option<&str>,
    ) -> Result<()> {
        let extents: Vec<usize> = variable
            .dims
            .iter()
            .enumerate()
            .map(|(axis, dim)| {
                if *dim == self.primary_dim {
                    0
                } else {
                    variable.data.len_of(axis)
                }
            })
            .collect();

        if let Some(ragged) = ragged_dim {
            if let Some(extent) = variable.extent_of(ragged) {
                self.ragged_extent = Some(self.ragged_extent.map_or(extent, |e| e.max(extent)));
            }
        }

        match self.variables.get_mut(name) {
            None => {
                self.variables.insert(
                    name.to_string(),
                    VariableSchema {
                        data_type: variable.data_type(),
                        dims: variable.dims.clone(),
                        extents,
                    },
                );
            }
            Some(known) => {
                if known.dims != variable.dims {
                    return Err(FathomError::shape_mismatch(
                        name,
                        format!("{:?}", known.dims),
                        format!("{:?}", variable.dims),
                    ));
                }
                if known.data_type != variable.data_type() {
                    return Err(FathomError::DataTypeMismatch {
                        array: name.to_string(),
                        stored: known.data_type.to_string(),
                        incoming: variable.data_type().to_string(),
                    });
                }
                for (axis, dim) in variable.dims.iter().enumerate() {
                    let is_ragged = ragged_dim == Some(dim.as_str());
                    if is_ragged {
                        known.extents[axis] = known.extents[axis].max(extents[axis]);
                    } else if known.extents[axis] != extents[axis] {
                        return Err(FathomError::shape_mismatch(
                            name,
                            format!("{} = {}", dim, known.extents[axis]),
                            format!("{} = {}", dim, extents[axis]),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Check the batch against arrays already in `store`
    pub fn validate_against(&self, store: &ChunkedStore) -> Result<()> {
        if self.primary_dim != store.primary_dim() {
            return Err(FathomError::invalid_chunk(format!(
                "chunks are keyed on '{}' but the store on '{}'",
                self.primary_dim,
                store.primary_dim()
            )));
        }

        for (name, variable) in &self.variables {
            if !store.has_array(name) {
                continue;
            }
            let meta = store.array_meta(name)?;
            if meta.dimension_names != variable.dims {
                return Err(FathomError::shape_mismatch(
                    name,
                    format!("{:?}", meta.dimension_names),
                    format!("{:?}", variable.dims),
                ));
            }
            if meta.data_type != variable.data_type {
                return Err(FathomError::DataTypeMismatch {
                    array: name.clone(),
                    stored: meta.data_type.to_string(),
                    incoming: variable.data_type.to_string(),
                });
            }
            if self.static_values.contains_key(name) {
                continue;
            }
            for (axis, dim) in variable.dims.iter().enumerate() {
                if *dim == self.primary_dim || store.ragged_dim() == Some(dim.as_str()) {
                    continue;
                }
                if meta.shape[axis] != variable.extents[axis] {
                    return Err(FathomError::shape_mismatch(
                        name,
                        format!("{} = {}", dim, meta.shape[axis]),
                        format!("{} = {}", dim, variable.extents[axis]),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Shape of `name` when created for a batch ending at `final_size`
    pub fn creation_shape(
        &self,
        name: &str,
        final_size: usize,
        ragged_dim: Option<&str>,
        ragged_extent: Option<usize>,
    ) -> Option<Vec<usize>> {
        let variable = self.variables.get(name)?;
        Some(
            variable
                .dims
                .iter()
                .zip(&variable.extents)
                .map(|(dim, &extent)| {
                    if *dim == self.primary_dim {
                        final_size
                    } else if ragged_dim == Some(dim.as_str()) {
                        ragged_extent.unwrap_or(extent).max(extent)
                    } else {
                        extent
                    }
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_core::{StoreConfig, TypedArray};
    use ndarray::Array2;
    use tempfile::TempDir;

    fn chunk(index: Vec<f64>, beams: usize) -> IncomingChunk {
        let n = index.len();
        IncomingChunk::new(index)
            .unwrap()
            .with_variable(
                "depth",
                ["time", "beam"],
                TypedArray::from(Array2::<f32>::zeros((n, beams)).into_dyn()),
            )
            .unwrap()
            .with_variable("beam", ["beam"], TypedArray::arange(DataType::Int32, beams))
            .unwrap()
    }

    #[test]
    fn test_ragged_extent_is_batch_max() {
        let chunks = vec![chunk(vec![0.0, 1.0], 3), chunk(vec![2.0], 5)];
        let schema = BatchSchema::from_chunks(&chunks, Some("beam")).unwrap();
        assert_eq!(schema.ragged_extent, Some(5));
        assert_eq!(schema.variables["depth"].extents, vec![0, 5]);
        assert!(schema.variables.contains_key("time"));
        assert_eq!(schema.static_values["beam"].data.len(), 3);
        assert_eq!(
            schema.creation_shape("depth", 10, Some("beam"), Some(5)),
            Some(vec![10, 5])
        );
    }

    #[test]
    fn test_inconsistent_types_rejected() {
        let a = IncomingChunk::new(vec![0.0])
            .unwrap()
            .with_variable("tvu", ["time"], TypedArray::from(ndarray::arr1(&[1.0f32]).into_dyn()))
            .unwrap();
        let b = IncomingChunk::new(vec![1.0])
            .unwrap()
            .with_variable("tvu", ["time"], TypedArray::from(ndarray::arr1(&[1.0f64]).into_dyn()))
            .unwrap();
        let err = BatchSchema::from_chunks(&[a, b], Some("beam")).unwrap_err();
        assert!(matches!(err, FathomError::DataTypeMismatch { .. }));
    }

    #[test]
    fn test_store_dimension_order_checked() {
        let dir = TempDir::new().unwrap();
        let store =
            ChunkedStore::create_or_open(dir.path().join("s.fstore"), StoreConfig::for_testing())
                .unwrap();
        store
            .create_array(
                "depth",
                DataType::Float32,
                &["beam".to_string(), "time".to_string()],
                &[3, 2],
            )
            .unwrap();
        let schema = BatchSchema::from_chunks(&[chunk(vec![0.0], 3)], Some("beam")).unwrap();
        let err = schema.validate_against(&store).unwrap_err();
        assert!(matches!(err, FathomError::ShapeMismatch { .. }));
    }
}
