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

//! Element types and their no-data sentinels.
//!
//! Every storable element type carries a reserved "no data" value. Newly
//! allocated cells, vacated push-forward gaps and ragged padding all hold
//! this sentinel, so readers can tell written cells from filler:
//!
//! | type   | sentinel     |
//! |--------|--------------|
//! | f32    | NaN          |
//! | f64    | NaN          |
//! | i32    | `i32::MAX`   |
//! | i64    | `i64::MAX`   |
//! | u8     | `u8::MAX`    |
//! | String | `""`         |

use crate::array::TypedArray;
use ndarray::{ArrayD, ArrayViewD};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a stored array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32,
    Float64,
    Int32,
    Int64,
    UInt8,
    Text,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::Text => "text",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar type that can live in a chunked array
pub trait Element:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const DATA_TYPE: DataType;

    /// Reserved filler value
    fn no_data() -> Self;

    fn is_no_data(&self) -> bool;

    /// Value of position `i` in a regenerated coordinate axis
    fn from_index(i: usize) -> Self;

    fn into_typed(array: ArrayD<Self>) -> TypedArray;

    fn view_of(array: &TypedArray) -> Option<ArrayViewD<'_, Self>>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $no_data:expr, $is_no_data:expr, $from_index:expr) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn no_data() -> Self {
                $no_data
            }

            fn is_no_data(&self) -> bool {
                ($is_no_data)(self)
            }

            fn from_index(i: usize) -> Self {
                ($from_index)(i)
            }

            fn into_typed(array: ArrayD<Self>) -> TypedArray {
                TypedArray::$variant(array)
            }

            fn view_of(array: &TypedArray) -> Option<ArrayViewD<'_, Self>> {
                match array {
                    TypedArray::$variant(a) => Some(a.view()),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f32, Float32, f32::NAN, |v: &f32| v.is_nan(), |i: usize| i as f32);
impl_element!(f64, Float64, f64::NAN, |v: &f64| v.is_nan(), |i: usize| i as f64);
impl_element!(i32, Int32, i32::MAX, |v: &i32| *v == i32::MAX, |i: usize| i as i32);
impl_element!(i64, Int64, i64::MAX, |v: &i64| *v == i64::MAX, |i: usize| i as i64);
impl_element!(u8, UInt8, u8::MAX, |v: &u8| *v == u8::MAX, |i: usize| i as u8);
impl_element!(
    String,
    Text,
    String::new(),
    |v: &String| v.is_empty(),
    |i: usize| i.to_string()
);

/// Run `$body` with `$t` bound to the Rust element type of `$dtype`.
///
/// ```ignore
/// let out = with_element_type!(meta.data_type, T => read_region::<T>(&meta, &region)?);
/// ```
#[macro_export]
macro_rules! with_element_type {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::DataType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::DataType::Float64 => {
                type $t = f64;
                $body
            }
            $crate::DataType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::DataType::Int64 => {
                type $t = i64;
                $body
            }
            $crate::DataType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::DataType::Text => {
                type $t = ::std::string::String;
                $body
            }
        }
    };
}
