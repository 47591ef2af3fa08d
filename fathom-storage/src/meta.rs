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

//! Metadata layout of a chunked store.
//!
//! A store is a zarr v3 hierarchy on the local filesystem:
//!
//! ```text
//! <store>/
//!   zarr.json           root group; `_fathom` holds the dimension roles,
//!                       every other key is a user attribute
//!   .lock               structural lock
//!   <array>/
//!     zarr.json         zarr array metadata; attributes carry
//!                       `_dimension_names`, `_data_type`, `_chunk_shape`
//!     .lock             chunk write lock
//!     c/<i>/<j>...      chunks
//! ```
//!
//! Chunks that were never written read back as the array fill value, which
//! is the no-data sentinel of its element type.

use fathom_core::{AttributeValue, DataType, FathomError, Result, StoreAttributes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Range;
use zarrs::array::{DataType as ZarrDataType, FillValue};

pub const FORMAT_VERSION: u32 = 2;
pub const ZARR_METADATA_FILE: &str = "zarr.json";
pub const LOCK_FILE: &str = ".lock";
pub const STORE_ATTRIBUTE: &str = "_fathom";
pub const DIMENSION_NAMES_ATTRIBUTE: &str = "_dimension_names";

/// Dimension roles of a store, kept under [`STORE_ATTRIBUTE`] in the root
/// group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub format_version: u32,
    pub primary_dim: String,
    pub ragged_dim: Option<String>,
}

impl StoreMeta {
    /// Root group attributes holding `self` and `attributes`
    pub fn group_attributes(&self, attributes: &StoreAttributes) -> Result<Map<String, Value>> {
        let mut map: Map<String, Value> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();
        map.insert(STORE_ATTRIBUTE.to_string(), serde_json::to_value(self)?);
        Ok(map)
    }

    /// Split root group attributes into the dimension roles and the user
    /// attributes
    pub fn from_group_attributes(map: &Map<String, Value>) -> Result<(Self, StoreAttributes)> {
        let meta = map
            .get(STORE_ATTRIBUTE)
            .cloned()
            .ok_or_else(|| FathomError::Serialization(format!("missing '{}'", STORE_ATTRIBUTE)))?;
        let meta: StoreMeta = serde_json::from_value(meta)?;
        let attributes = map
            .iter()
            .filter(|(k, _)| k.as_str() != STORE_ATTRIBUTE)
            .map(|(k, v)| (k.clone(), AttributeValue::from(v.clone())))
            .collect();
        Ok((meta, attributes))
    }
}

/// Attributes written onto every zarr array of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArrayAttributes {
    #[serde(rename = "_dimension_names")]
    dimension_names: Vec<String>,
    #[serde(rename = "_data_type")]
    data_type: DataType,
    #[serde(rename = "_chunk_shape")]
    chunk_shape: Vec<usize>,
}

/// A stored array as the store sees it
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMeta {
    pub data_type: DataType,
    pub shape: Vec<usize>,
    pub chunk_shape: Vec<usize>,
    pub dimension_names: Vec<String>,
}

impl ArrayMeta {
    /// Rebuild from zarr array attributes and current shape
    pub fn from_zarr(name: &str, attributes: &Map<String, Value>, shape: &[u64]) -> Result<Self> {
        let attrs: ArrayAttributes = serde_json::from_value(Value::Object(attributes.clone()))
            .map_err(|e| FathomError::ArrayFormat {
                array: name.to_string(),
                reason: e.to_string(),
            })?;
        if attrs.dimension_names.len() != shape.len() {
            return Err(FathomError::ArrayFormat {
                array: name.to_string(),
                reason: format!(
                    "{} dimension names for {} axes",
                    attrs.dimension_names.len(),
                    shape.len()
                ),
            });
        }
        Ok(Self {
            data_type: attrs.data_type,
            shape: shape.iter().map(|&len| len as usize).collect(),
            chunk_shape: attrs.chunk_shape,
            dimension_names: attrs.dimension_names,
        })
    }

    /// Attributes to store on the zarr array
    pub fn zarr_attributes(&self) -> Result<Map<String, Value>> {
        let attrs = ArrayAttributes {
            dimension_names: self.dimension_names.clone(),
            data_type: self.data_type,
            chunk_shape: self.chunk_shape.clone(),
        };
        match serde_json::to_value(attrs)? {
            Value::Object(map) => Ok(map),
            other => Err(FathomError::Serialization(format!(
                "array attributes serialized to {}",
                other
            ))),
        }
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dimension_names.iter().position(|d| d == dim)
    }

    pub fn extent_of(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|axis| self.shape[axis])
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Whole-array region
    pub fn full_region(&self) -> Vec<Range<usize>> {
        self.shape.iter().map(|&len| 0..len).collect()
    }
}

/// Zarr element type and fill value for `data_type`. The fill value is the
/// no-data sentinel.
pub fn zarr_data_type(data_type: DataType) -> (ZarrDataType, FillValue) {
    match data_type {
        DataType::Float32 => (ZarrDataType::Float32, FillValue::from(f32::NAN)),
        DataType::Float64 => (ZarrDataType::Float64, FillValue::from(f64::NAN)),
        DataType::Int32 => (ZarrDataType::Int32, FillValue::from(i32::MAX)),
        DataType::Int64 => (ZarrDataType::Int64, FillValue::from(i64::MAX)),
        DataType::UInt8 => (ZarrDataType::UInt8, FillValue::from(u8::MAX)),
        DataType::Text => (ZarrDataType::String, FillValue::new(Vec::new())),
    }
}

/// Reject names that would escape the store directory or collide with
/// store bookkeeping files
pub fn validate_array_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name == ZARR_METADATA_FILE;
    if bad {
        return Err(FathomError::invalid_chunk(format!(
            "'{}' is not a valid array name",
            name
        )));
    }
    Ok(())
}
