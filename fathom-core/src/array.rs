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

//! Dynamically typed n-dimensional arrays

use crate::dtype::{DataType, Element};
use crate::error::{FathomError, Result};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use std::ops::Range;

/// An owned n-dimensional array of one of the storable element types
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    UInt8(ArrayD<u8>),
    Text(ArrayD<String>),
}

macro_rules! visit {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            TypedArray::Float32($arr) => $body,
            TypedArray::Float64($arr) => $body,
            TypedArray::Int32($arr) => $body,
            TypedArray::Int64($arr) => $body,
            TypedArray::UInt8($arr) => $body,
            TypedArray::Text($arr) => $body,
        }
    };
}

macro_rules! map {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            TypedArray::Float32($arr) => TypedArray::Float32($body),
            TypedArray::Float64($arr) => TypedArray::Float64($body),
            TypedArray::Int32($arr) => TypedArray::Int32($body),
            TypedArray::Int64($arr) => TypedArray::Int64($body),
            TypedArray::UInt8($arr) => TypedArray::UInt8($body),
            TypedArray::Text($arr) => TypedArray::Text($body),
        }
    };
}

impl TypedArray {
    /// Array of `shape` filled with the type's no-data sentinel
    pub fn full(data_type: DataType, shape: &[usize]) -> Self {
        crate::with_element_type!(data_type, T => {
            T::into_typed(ArrayD::from_elem(IxDyn(shape), T::no_data()))
        })
    }

    /// `0..len` as a one-dimensional array of `data_type`
    pub fn arange(data_type: DataType, len: usize) -> Self {
        crate::with_element_type!(data_type, T => {
            T::into_typed(ArrayD::from_shape_fn(IxDyn(&[len]), |ix| T::from_index(ix[0])))
        })
    }

    pub fn from_vec<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(T::into_typed(array))
    }

    pub fn from_array<T: Element>(array: ArrayD<T>) -> Self {
        T::into_typed(array)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            TypedArray::Float32(_) => DataType::Float32,
            TypedArray::Float64(_) => DataType::Float64,
            TypedArray::Int32(_) => DataType::Int32,
            TypedArray::Int64(_) => DataType::Int64,
            TypedArray::UInt8(_) => DataType::UInt8,
            TypedArray::Text(_) => DataType::Text,
        }
    }

    pub fn shape(&self) -> &[usize] {
        visit!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len_of(&self, axis: usize) -> usize {
        self.shape().get(axis).copied().unwrap_or(0)
    }

    pub fn view<T: Element>(&self) -> Option<ArrayViewD<'_, T>> {
        T::view_of(self)
    }

    /// Typed view, or a `DataTypeMismatch` naming `array`
    pub fn expect_view<T: Element>(&self, array: &str) -> Result<ArrayViewD<'_, T>> {
        T::view_of(self).ok_or_else(|| FathomError::DataTypeMismatch {
            array: array.to_string(),
            stored: T::DATA_TYPE.to_string(),
            incoming: self.data_type().to_string(),
        })
    }

    /// Copy of `range` along `axis`
    pub fn slice_axis(&self, axis: usize, range: Range<usize>) -> Self {
        map!(self, a => a.slice_axis(Axis(axis), Slice::from(range)).to_owned())
    }

    /// Gather `indices` along `axis`
    pub fn select(&self, axis: usize, indices: &[usize]) -> Self {
        map!(self, a => a.select(Axis(axis), indices))
    }

    /// Grow `axis` to `len`, filling new cells with the sentinel
    pub fn pad_axis(&self, axis: usize, len: usize) -> Self {
        map!(self, a => pad_axis(a, axis, len))
    }

    /// Number of cells holding the no-data sentinel
    pub fn count_no_data(&self) -> usize {
        visit!(self, a => a.iter().filter(|v| v.is_no_data()).count())
    }

    pub fn len(&self) -> usize {
        visit!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn pad_axis<T: Element>(array: &ArrayD<T>, axis: usize, len: usize) -> ArrayD<T> {
    let current = array.len_of(Axis(axis));
    if len <= current {
        return array.clone();
    }
    let mut shape = array.shape().to_vec();
    shape[axis] = len;
    let mut out = ArrayD::from_elem(IxDyn(&shape), T::no_data());
    out.slice_axis_mut(Axis(axis), Slice::from(0..current))
        .assign(array);
    out
}

impl<T: Element> From<ArrayD<T>> for TypedArray {
    fn from(array: ArrayD<T>) -> Self {
        T::into_typed(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_full_uses_sentinel() {
        let a = TypedArray::full(DataType::Int32, &[2, 3]);
        assert_eq!(a.shape(), &[2, 3]);
        assert_eq!(a.count_no_data(), 6);

        let t = TypedArray::full(DataType::Text, &[4]);
        assert_eq!(t.count_no_data(), 4);
    }

    #[test]
    fn test_pad_ragged_axis() {
        let a = TypedArray::from(array![[1.0f32, 2.0], [3.0, 4.0]].into_dyn());
        let padded = a.pad_axis(1, 4);
        assert_eq!(padded.shape(), &[2, 4]);
        assert_eq!(padded.count_no_data(), 4);

        let view = padded.view::<f32>().unwrap();
        assert_eq!(view[[1, 1]], 4.0);
        assert!(view[[1, 3]].is_nan());

        // narrower target is a no-op
        assert_eq!(a.pad_axis(1, 1), a);
    }

    #[test]
    fn test_select_and_slice() {
        let a = TypedArray::from(array![10i64, 11, 12, 13].into_dyn());
        let picked = a.select(0, &[3, 0]);
        assert_eq!(
            picked.view::<i64>().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![13, 10]
        );

        let sliced = a.slice_axis(0, 1..3);
        assert_eq!(
            sliced.view::<i64>().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![11, 12]
        );
    }

    #[test]
    fn test_arange_regenerates_coordinates() {
        let beams = TypedArray::arange(DataType::Int32, 5);
        assert_eq!(
            beams.view::<i32>().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_expect_view_type_mismatch() {
        let a = TypedArray::from(array![1u8, 2].into_dyn());
        assert!(a.expect_view::<u8>("flags").is_ok());
        let err = a.expect_view::<f64>("flags").unwrap_err();
        assert!(matches!(err, FathomError::DataTypeMismatch { .. }));
    }

    #[test]
    fn test_from_vec_shape_checked() {
        assert!(TypedArray::from_vec(&[2, 2], vec![1.0f64, 2.0, 3.0, 4.0]).is_ok());
        assert!(TypedArray::from_vec(&[2, 2], vec![1.0f64]).is_err());
    }
}
