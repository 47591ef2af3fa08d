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

//! Incoming chunks: a time-sorted block of records and their variables

use crate::array::TypedArray;
use crate::dtype::DataType;
use crate::error::{FathomError, Result};
use crate::Timestamp;
use std::collections::BTreeMap;

/// Default name of the record (time) dimension
pub const PRIMARY_DIM: &str = "time";

/// Default name of the ragged (beam) dimension
pub const RAGGED_DIM: &str = "beam";

/// One named variable of a chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub dims: Vec<String>,
    pub data: TypedArray,
}

impl Variable {
    pub fn new<S: Into<String>>(dims: impl IntoIterator<Item = S>, data: TypedArray) -> Self {
        Self {
            dims: dims.into_iter().map(Into::into).collect(),
            data,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn extent_of(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|axis| self.data.len_of(axis))
    }
}

/// A block of records keyed by a strictly ascending timestamp index.
///
/// Variables that span the primary dimension carry one slice per record;
/// variables without it (the ragged coordinate, static lookup tables) are
/// written once per store.
#[derive(Debug, Clone)]
pub struct IncomingChunk {
    primary_dim: String,
    index: Vec<Timestamp>,
    variables: BTreeMap<String, Variable>,
}

impl IncomingChunk {
    /// Chunk keyed on the default `time` dimension
    pub fn new(index: Vec<Timestamp>) -> Result<Self> {
        Self::with_primary_dim(PRIMARY_DIM, index)
    }

    pub fn with_primary_dim(primary_dim: impl Into<String>, index: Vec<Timestamp>) -> Result<Self> {
        let primary_dim = primary_dim.into();
        if index.is_empty() {
            return Err(FathomError::invalid_chunk("chunk index is empty"));
        }
        if let Some(bad) = index.iter().find(|t| !t.is_finite()) {
            return Err(FathomError::invalid_chunk(format!(
                "non-finite timestamp {} in chunk index",
                bad
            )));
        }
        if let Some(w) = index.windows(2).find(|w| w[0] >= w[1]) {
            return Err(FathomError::invalid_chunk(format!(
                "chunk index not strictly ascending at {} -> {}",
                w[0], w[1]
            )));
        }
        Ok(Self {
            primary_dim,
            index,
            variables: BTreeMap::new(),
        })
    }

    /// Builder form of [`IncomingChunk::insert_variable`]
    pub fn with_variable<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        dims: impl IntoIterator<Item = S>,
        data: TypedArray,
    ) -> Result<Self> {
        self.insert_variable(name, Variable::new(dims, data))?;
        Ok(self)
    }

    pub fn insert_variable(&mut self, name: impl Into<String>, variable: Variable) -> Result<()> {
        let name = name.into();
        if name == self.primary_dim {
            return Err(FathomError::invalid_chunk(format!(
                "'{}' is the chunk index and cannot be supplied as a variable",
                name
            )));
        }
        if variable.dims.len() != variable.data.ndim() {
            return Err(FathomError::shape_mismatch(
                &name,
                format!("{} dimension names", variable.data.ndim()),
                format!("{:?}", variable.dims),
            ));
        }
        let occurrences = variable
            .dims
            .iter()
            .filter(|d| **d == self.primary_dim)
            .count();
        if occurrences > 1 {
            return Err(FathomError::invalid_chunk(format!(
                "'{}' repeats the primary dimension",
                name
            )));
        }
        if let Some(extent) = variable.extent_of(&self.primary_dim) {
            if extent != self.index.len() {
                return Err(FathomError::shape_mismatch(
                    &name,
                    format!("{} records", self.index.len()),
                    format!("{} records", extent),
                ));
            }
        }
        self.variables.insert(name, variable);
        Ok(())
    }

    pub fn primary_dim(&self) -> &str {
        &self.primary_dim
    }

    pub fn index(&self) -> &[Timestamp] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn min_timestamp(&self) -> Timestamp {
        self.index[0]
    }

    pub fn max_timestamp(&self) -> Timestamp {
        self.index[self.index.len() - 1]
    }

    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// The index itself as a one-dimensional float64 variable
    pub fn index_variable(&self) -> Variable {
        let data = TypedArray::from(ndarray::Array1::from(self.index.clone()).into_dyn());
        Variable {
            dims: vec![self.primary_dim.clone()],
            data,
        }
    }

    /// Whether `variable` spans the primary dimension
    pub fn is_record_variable(&self, variable: &Variable) -> bool {
        variable.axis_of(&self.primary_dim).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_index_validation() {
        assert!(IncomingChunk::new(vec![]).is_err());
        assert!(IncomingChunk::new(vec![1.0, 1.0]).is_err());
        assert!(IncomingChunk::new(vec![2.0, 1.0]).is_err());
        assert!(IncomingChunk::new(vec![0.0, f64::NAN]).is_err());

        let chunk = IncomingChunk::new(vec![1.0, 2.5, 3.0]).unwrap();
        assert_eq!(chunk.min_timestamp(), 1.0);
        assert_eq!(chunk.max_timestamp(), 3.0);
    }

    #[test]
    fn test_variable_record_count_checked() {
        let chunk = IncomingChunk::new(vec![1.0, 2.0]).unwrap();
        let err = chunk
            .with_variable("sv", ["time"], TypedArray::from(array![1.0f32, 2.0, 3.0].into_dyn()))
            .unwrap_err();
        assert!(matches!(err, FathomError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_dims_must_match_rank() {
        let chunk = IncomingChunk::new(vec![1.0, 2.0]).unwrap();
        let err = chunk
            .with_variable(
                "depth",
                ["time"],
                TypedArray::from(Array2::<f32>::zeros((2, 3)).into_dyn()),
            )
            .unwrap_err();
        assert!(matches!(err, FathomError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_static_and_record_variables() {
        let chunk = IncomingChunk::new(vec![1.0, 2.0])
            .unwrap()
            .with_variable(
                "depth",
                ["time", "beam"],
                TypedArray::from(Array2::<f32>::zeros((2, 3)).into_dyn()),
            )
            .unwrap()
            .with_variable("beam", ["beam"], TypedArray::arange(DataType::Int32, 3))
            .unwrap();

        let depth = chunk.variable("depth").unwrap();
        assert!(chunk.is_record_variable(depth));
        assert_eq!(depth.extent_of("beam"), Some(3));

        let beam = chunk.variable("beam").unwrap();
        assert!(!chunk.is_record_variable(beam));

        let index = chunk.index_variable();
        assert_eq!(index.dims, vec!["time".to_string()]);
        assert_eq!(index.data.data_type(), DataType::Float64);
    }

    #[test]
    fn test_index_name_reserved() {
        let chunk = IncomingChunk::new(vec![1.0]).unwrap();
        assert!(chunk
            .with_variable("time", ["time"], TypedArray::from(array![1.0f64].into_dyn()))
            .is_err());
    }
}
