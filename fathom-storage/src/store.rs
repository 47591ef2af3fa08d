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

//! Chunked n-dimensional array store.
//!
//! A store is a zarr v3 hierarchy of named arrays that share a primary
//! (record) dimension. Arrays grow along any axis by rewriting their zarr
//! metadata; chunks outside the written region are never stored and read
//! back as the fill value, which is the no-data sentinel.
//!
//! Region writes are read-modify-write under a per-array file lock, so
//! threads and processes may write disjoint regions of the same array
//! concurrently. Structural changes (resize, ragged expansion, array
//! creation, push-forward) happen under the store-level lock.

use crate::lock::LockGuard;
use crate::meta::{
    validate_array_name, zarr_data_type, ArrayMeta, StoreMeta, FORMAT_VERSION, LOCK_FILE,
    ZARR_METADATA_FILE,
};
use crate::planner::Placement;
use fathom_core::{
    with_element_type, DataType, Element, FathomError, Result, RetryPolicy, StoreAttributes,
    StoreConfig, Timestamp, TypedArray,
};
use ndarray::{ArrayD, IxDyn};
use std::borrow::Cow;
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zarrs::array::chunk_grid::ChunkGrid;
use zarrs::array::{Array, ArrayBuilder, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs::filesystem::FilesystemStore;
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::{
    ReadableWritableListableStorage, ReadableWritableListableStorageTraits, StorePrefix,
    WritableStorageTraits,
};

type ZarrArray = Array<dyn ReadableWritableListableStorageTraits>;

const ROOT_GROUP: &str = "/";

pub struct ChunkedStore {
    root: PathBuf,
    storage: ReadableWritableListableStorage,
    primary_dim: String,
    ragged_dim: Option<String>,
    config: StoreConfig,
    retry: RetryPolicy,
}

fn unavailable(path: &Path, reason: impl Display) -> FathomError {
    FathomError::StorageUnavailable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Map a zarrs failure on `array`. I/O underneath keeps its kind so lock
/// and share interference stays retryable.
fn zarr_error<E>(array: &str, err: E) -> FathomError
where
    E: std::error::Error + 'static,
{
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return FathomError::Io(io::Error::new(io_err.kind(), format!("{}: {}", array, err)));
        }
        source = e.source();
    }
    FathomError::ArrayFormat {
        array: array.to_string(),
        reason: err.to_string(),
    }
}

fn array_key(name: &str) -> String {
    format!("/{}", name)
}

fn subset_of(region: &[Range<usize>]) -> ArraySubset {
    let ranges: Vec<Range<u64>> = region
        .iter()
        .map(|r| r.start as u64..r.end as u64)
        .collect();
    ArraySubset::new_with_ranges(&ranges)
}

impl ChunkedStore {
    /// Open the store at `path`, creating it when absent
    pub fn create_or_open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if root.exists() && !root.is_dir() {
            return Err(unavailable(&root, "path exists and is not a directory"));
        }
        fs::create_dir_all(&root).map_err(|e| unavailable(&root, e))?;

        // an unwritable store is fatal, not something to retry
        let lock_path = root.join(LOCK_FILE);
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| unavailable(&root, e))?;

        let retry = config.retry.policy();
        let storage = Self::connect(&root)?;
        let _guard = LockGuard::acquire(&lock_path, &retry, "open store")?;

        let meta = if root.join(ZARR_METADATA_FILE).is_file() {
            Self::load_store_meta(&root, &storage)?.0
        } else {
            let meta = StoreMeta {
                format_version: FORMAT_VERSION,
                primary_dim: config.primary_dim.clone(),
                ragged_dim: config.ragged_dim.clone(),
            };
            let group = GroupBuilder::new()
                .attributes(meta.group_attributes(&StoreAttributes::new())?)
                .build(Arc::clone(&storage), ROOT_GROUP)
                .map_err(|e| unavailable(&root, e))?;
            group.store_metadata().map_err(|e| unavailable(&root, e))?;
            info!(path = %root.display(), "Created chunked store");
            meta
        };

        Ok(Self::from_meta(root, storage, meta, config, retry))
    }

    /// Open an existing store
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.join(ZARR_METADATA_FILE).is_file() {
            return Err(unavailable(&root, "no store found"));
        }
        let storage = Self::connect(&root)?;
        let (meta, _) = Self::load_store_meta(&root, &storage)?;
        let retry = config.retry.policy();
        Ok(Self::from_meta(root, storage, meta, config, retry))
    }

    fn connect(root: &Path) -> Result<ReadableWritableListableStorage> {
        let store = FilesystemStore::new(root).map_err(|e| unavailable(root, e))?;
        Ok(Arc::new(store))
    }

    fn load_store_meta(
        root: &Path,
        storage: &ReadableWritableListableStorage,
    ) -> Result<(StoreMeta, StoreAttributes)> {
        let group =
            Group::open(Arc::clone(storage), ROOT_GROUP).map_err(|e| unavailable(root, e))?;
        let (meta, attributes) = StoreMeta::from_group_attributes(group.attributes())
            .map_err(|e| unavailable(root, e))?;
        if meta.format_version != FORMAT_VERSION {
            return Err(unavailable(
                root,
                format!("unsupported store format version {}", meta.format_version),
            ));
        }
        Ok((meta, attributes))
    }

    fn from_meta(
        root: PathBuf,
        storage: ReadableWritableListableStorage,
        meta: StoreMeta,
        config: StoreConfig,
        retry: RetryPolicy,
    ) -> Self {
        if meta.primary_dim != config.primary_dim || meta.ragged_dim != config.ragged_dim {
            warn!(
                path = %root.display(),
                stored_primary = %meta.primary_dim,
                stored_ragged = ?meta.ragged_dim,
                "Store dimension roles differ from configuration; using stored roles"
            );
        }
        Self {
            root,
            storage,
            primary_dim: meta.primary_dim,
            ragged_dim: meta.ragged_dim,
            config,
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn primary_dim(&self) -> &str {
        &self.primary_dim
    }

    pub fn ragged_dim(&self) -> Option<&str> {
        self.ragged_dim.as_deref()
    }

    fn array_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Exclusive store-level lock for structural mutations.
    ///
    /// Not reentrant: a second acquisition while the guard lives contends
    /// with it.
    pub fn lock_structure(&self) -> Result<LockGuard> {
        LockGuard::acquire(&self.root.join(LOCK_FILE), &self.retry, "structural lock")
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    pub fn has_array(&self, name: &str) -> bool {
        self.array_dir(name).join(ZARR_METADATA_FILE).is_file()
    }

    /// Names of all arrays, sorted
    pub fn array_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().join(ZARR_METADATA_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_array(&self, name: &str) -> Result<ZarrArray> {
        if !self.has_array(name) {
            return Err(FathomError::ArrayNotFound(name.to_string()));
        }
        self.retry.run("open array", || {
            Array::open(Arc::clone(&self.storage), &array_key(name))
                .map_err(|e| zarr_error(name, e))
        })
    }

    pub fn array_meta(&self, name: &str) -> Result<ArrayMeta> {
        let array = self.open_array(name)?;
        ArrayMeta::from_zarr(name, array.attributes(), array.shape())
    }

    /// Create `name` with the configured chunk layout.
    ///
    /// An existing array with the same data type and dimensions is returned
    /// unchanged.
    pub fn create_array(
        &self,
        name: &str,
        data_type: DataType,
        dims: &[String],
        shape: &[usize],
    ) -> Result<ArrayMeta> {
        validate_array_name(name)?;
        if dims.len() != shape.len() {
            return Err(FathomError::shape_mismatch(
                name,
                format!("{} dimension names", shape.len()),
                format!("{:?}", dims),
            ));
        }

        if self.has_array(name) {
            let existing = self.array_meta(name)?;
            if existing.data_type != data_type {
                return Err(FathomError::DataTypeMismatch {
                    array: name.to_string(),
                    stored: existing.data_type.to_string(),
                    incoming: data_type.to_string(),
                });
            }
            if existing.dimension_names != dims {
                return Err(FathomError::shape_mismatch(
                    name,
                    format!("{:?}", existing.dimension_names),
                    format!("{:?}", dims),
                ));
            }
            return Ok(existing);
        }

        let meta = ArrayMeta {
            data_type,
            shape: shape.to_vec(),
            chunk_shape: self
                .config
                .layout
                .chunk_shape(&self.primary_dim, dims, shape),
            dimension_names: dims.to_vec(),
        };
        let (zarr_type, fill_value) = zarr_data_type(data_type);
        let chunk_grid = ChunkGrid::try_from(
            meta.chunk_shape
                .iter()
                .map(|&len| len as u64)
                .collect::<Vec<u64>>(),
        )
        .map_err(|e| FathomError::ArrayFormat {
            array: name.to_string(),
            reason: e.to_string(),
        })?;

        let array = ArrayBuilder::new(
            shape.iter().map(|&len| len as u64).collect(),
            zarr_type,
            chunk_grid,
            fill_value,
        )
        .attributes(meta.zarr_attributes()?)
        .build(Arc::clone(&self.storage), &array_key(name))
        .map_err(|e| zarr_error(name, e))?;
        self.retry.run("write array metadata", || {
            array.store_metadata().map_err(|e| zarr_error(name, e))
        })?;

        debug!(array = name, shape = ?meta.shape, chunks = ?meta.chunk_shape, "Created array");
        Ok(meta)
    }

    /// Grow `name` to `new_shape`; any smaller axis is rejected
    pub fn resize(&self, name: &str, new_shape: &[usize]) -> Result<()> {
        let mut array = self.open_array(name)?;
        let meta = ArrayMeta::from_zarr(name, array.attributes(), array.shape())?;
        if new_shape.len() != meta.ndim() {
            return Err(FathomError::shape_mismatch(
                name,
                format!("{} axes", meta.ndim()),
                format!("{} axes", new_shape.len()),
            ));
        }
        for (axis, (&current, &requested)) in meta.shape.iter().zip(new_shape).enumerate() {
            if requested < current {
                return Err(FathomError::ShrinkRejected {
                    array: name.to_string(),
                    axis,
                    current,
                    requested,
                });
            }
        }
        if meta.shape == new_shape {
            return Ok(());
        }
        debug!(array = name, from = ?meta.shape, to = ?new_shape, "Resizing array");
        array.set_shape(new_shape.iter().map(|&len| len as u64).collect());
        self.retry.run("write array metadata", || {
            array.store_metadata().map_err(|e| zarr_error(name, e))
        })
    }

    /// Grow the `dim` axis of `name` to `len`. Returns whether the array
    /// changed; arrays without `dim` are left alone.
    pub fn resize_dimension(&self, name: &str, dim: &str, len: usize) -> Result<bool> {
        let meta = self.array_meta(name)?;
        let Some(axis) = meta.axis_of(dim) else {
            return Ok(false);
        };
        if meta.shape[axis] == len {
            return Ok(false);
        }
        let mut shape = meta.shape.clone();
        shape[axis] = len;
        self.resize(name, &shape)?;
        Ok(true)
    }

    /// Largest extent of `dim` across all arrays
    pub fn dimension_extent(&self, dim: &str) -> Result<Option<usize>> {
        let mut extent: Option<usize> = None;
        for name in self.array_names()? {
            if let Some(len) = self.array_meta(&name)?.extent_of(dim) {
                extent = Some(extent.map_or(len, |e: usize| e.max(len)));
            }
        }
        Ok(extent)
    }

    /// Grow the ragged dimension of every array spanning it to `target`
    /// and regenerate its coordinate array as `0..target`.
    ///
    /// Returns the names of the resized data arrays.
    pub fn expand_ragged_dimension(&self, target: usize) -> Result<Vec<String>> {
        let ragged = self
            .ragged_dim
            .clone()
            .ok_or_else(|| FathomError::Config("store has no ragged dimension".to_string()))?;

        let mut resized = Vec::new();
        let mut coordinate_type = DataType::Int64;
        for name in self.array_names()? {
            if name == ragged {
                coordinate_type = self.array_meta(&name)?.data_type;
                continue;
            }
            if self.resize_dimension(&name, &ragged, target)? {
                resized.push(name);
            }
        }
        self.regenerate_coordinate(&ragged, coordinate_type, target)?;

        info!(dim = %ragged, target, arrays = resized.len(), "Expanded ragged dimension");
        Ok(resized)
    }

    /// Write `0..len` into the one-dimensional coordinate array of `dim`
    pub fn regenerate_coordinate(&self, dim: &str, data_type: DataType, len: usize) -> Result<()> {
        if self.has_array(dim) {
            let meta = self.array_meta(dim)?;
            if meta.shape[0] < len {
                self.resize(dim, &[len])?;
            }
        } else {
            self.create_array(dim, data_type, &[dim.to_string()], &[len])?;
        }
        self.write_region(dim, &[0], &TypedArray::arange(data_type, len))
    }

    /// Remove `name` with its metadata and chunks
    pub fn delete_array(&self, name: &str) -> Result<()> {
        if !self.has_array(name) {
            return Err(FathomError::ArrayNotFound(name.to_string()));
        }
        let _guard = self.lock_structure()?;
        let prefix =
            StorePrefix::new(format!("{}/", name)).map_err(|e| zarr_error(name, e))?;
        self.retry.run("delete array", || {
            self.storage
                .erase_prefix(&prefix)
                .map_err(|e| zarr_error(name, e))
        })?;
        info!(array = name, "Deleted array");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Region I/O
    // ------------------------------------------------------------------

    fn check_region(&self, name: &str, meta: &ArrayMeta, region: &[Range<usize>]) -> Result<()> {
        if region.len() != meta.ndim() {
            return Err(FathomError::shape_mismatch(
                name,
                format!("{} axes", meta.ndim()),
                format!("{} axes", region.len()),
            ));
        }
        for (range, &len) in region.iter().zip(&meta.shape) {
            if range.start > range.end || range.end > len {
                return Err(FathomError::OutOfBounds {
                    array: name.to_string(),
                    start: range.start,
                    end: range.end,
                    len,
                });
            }
        }
        Ok(())
    }

    /// Read `region` of `name`; unwritten cells hold the sentinel
    pub fn read_region(&self, name: &str, region: &[Range<usize>]) -> Result<TypedArray> {
        let meta = self.array_meta(name)?;
        self.check_region(name, &meta, region)?;
        with_element_type!(meta.data_type, T => {
            let out = self
                .retry
                .run("read region", || self.read_region_typed::<T>(name, region))?;
            Ok(T::into_typed(out))
        })
    }

    /// Write `values` with its first cell at `origin`
    pub fn write_region(&self, name: &str, origin: &[usize], values: &TypedArray) -> Result<()> {
        let meta = self.array_meta(name)?;
        if origin.len() != meta.ndim() || values.ndim() != meta.ndim() {
            return Err(FathomError::shape_mismatch(
                name,
                format!("{} axes", meta.ndim()),
                format!("{} axes", values.ndim()),
            ));
        }
        let region: Vec<Range<usize>> = origin
            .iter()
            .zip(values.shape())
            .map(|(&start, &len)| start..start + len)
            .collect();
        self.check_region(name, &meta, &region)?;
        if region.iter().any(|r| r.is_empty()) {
            return Ok(());
        }

        with_element_type!(meta.data_type, T => {
            let elements: Vec<T> = values.expect_view::<T>(name)?.iter().cloned().collect();
            self.retry.run("write region", || {
                self.write_region_typed::<T>(name, &region, &elements)
            })
        })
    }

    /// Fill `range` of the primary axis with the sentinel
    pub fn fill_no_data(&self, name: &str, range: Range<usize>) -> Result<()> {
        let meta = self.array_meta(name)?;
        let axis = self.primary_axis(name, &meta)?;
        let mut shape = meta.shape.clone();
        shape[axis] = range.len();
        let mut origin = vec![0; meta.ndim()];
        origin[axis] = range.start;
        self.write_region(name, &origin, &TypedArray::full(meta.data_type, &shape))
    }

    fn primary_axis(&self, name: &str, meta: &ArrayMeta) -> Result<usize> {
        meta.axis_of(&self.primary_dim).ok_or_else(|| {
            FathomError::shape_mismatch(
                name,
                format!("an array spanning '{}'", self.primary_dim),
                format!("{:?}", meta.dimension_names),
            )
        })
    }

    /// Write one record slice per primary position of `placement`.
    ///
    /// `values` must follow the array's axis order. A ragged axis narrower
    /// than the store is padded with the sentinel; other axes must match.
    pub fn write_slice(&self, name: &str, placement: &Placement, values: &TypedArray) -> Result<()> {
        let meta = self.array_meta(name)?;
        let axis = self.primary_axis(name, &meta)?;
        if values.ndim() != meta.ndim() {
            return Err(FathomError::shape_mismatch(
                name,
                format!("{} axes", meta.ndim()),
                format!("{} axes", values.ndim()),
            ));
        }
        if values.len_of(axis) != placement.len() {
            return Err(FathomError::shape_mismatch(
                name,
                format!("{} records", placement.len()),
                format!("{} records", values.len_of(axis)),
            ));
        }
        let values = self.conform(name, &meta, axis, values)?;
        let mut origin = vec![0; meta.ndim()];

        match placement {
            Placement::Contiguous(range) => {
                origin[axis] = range.start;
                self.write_region(name, &origin, &values)
            }
            Placement::Indices(indices) => {
                let mut order: Vec<usize> = (0..indices.len()).collect();
                order.sort_by_key(|&k| indices[k]);
                if order.windows(2).any(|w| indices[w[0]] == indices[w[1]]) {
                    return Err(FathomError::invalid_chunk(format!(
                        "duplicate target positions writing '{}'",
                        name
                    )));
                }
                let sorted = values.select(axis, &order);

                // one region write per run of consecutive positions
                let mut start = 0;
                while start < order.len() {
                    let mut end = start + 1;
                    while end < order.len() && indices[order[end]] == indices[order[end - 1]] + 1 {
                        end += 1;
                    }
                    origin[axis] = indices[order[start]];
                    self.write_region(name, &origin, &sorted.slice_axis(axis, start..end))?;
                    start = end;
                }
                Ok(())
            }
        }
    }

    fn conform<'a>(
        &self,
        name: &str,
        meta: &ArrayMeta,
        primary_axis: usize,
        values: &'a TypedArray,
    ) -> Result<Cow<'a, TypedArray>> {
        let mut out = Cow::Borrowed(values);
        for (axis, dim) in meta.dimension_names.iter().enumerate() {
            if axis == primary_axis {
                continue;
            }
            let stored = meta.shape[axis];
            let incoming = values.len_of(axis);
            let ragged = self.ragged_dim.as_deref() == Some(dim.as_str());
            if ragged && incoming < stored {
                out = Cow::Owned(out.pad_axis(axis, stored));
            } else if incoming != stored {
                return Err(FathomError::shape_mismatch(
                    name,
                    format!("{} = {}", dim, stored),
                    format!("{} = {}", dim, incoming),
                ));
            }
        }
        Ok(out)
    }

    fn read_region_typed<T: Element + ElementOwned>(
        &self,
        name: &str,
        region: &[Range<usize>],
    ) -> Result<ArrayD<T>> {
        let shape: Vec<usize> = region.iter().map(|r| r.len()).collect();
        if shape.iter().any(|&len| len == 0) {
            return Ok(ArrayD::from_elem(IxDyn(&shape), T::no_data()));
        }
        let array = self.open_array(name)?;
        let values = array
            .retrieve_array_subset_elements::<T>(&subset_of(region))
            .map_err(|e| zarr_error(name, e))?;
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
    }

    fn write_region_typed<T: Element + ElementOwned>(
        &self,
        name: &str,
        region: &[Range<usize>],
        elements: &[T],
    ) -> Result<()> {
        let _guard = LockGuard::try_acquire(&self.array_dir(name).join(LOCK_FILE))?;
        let array = self.open_array(name)?;
        array
            .store_array_subset_elements::<T>(&subset_of(region), elements)
            .map_err(|e| zarr_error(name, e))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Records `range` of `name` along the primary dimension. Arrays that do
    /// not span the primary dimension are returned whole.
    pub fn read(&self, name: &str, range: Range<usize>) -> Result<TypedArray> {
        let meta = self.array_meta(name)?;
        let mut region = meta.full_region();
        if let Some(axis) = meta.axis_of(&self.primary_dim) {
            region[axis] = range;
        }
        self.read_region(name, &region)
    }

    pub fn read_all(&self, name: &str) -> Result<TypedArray> {
        let meta = self.array_meta(name)?;
        self.read_region(name, &meta.full_region())
    }

    /// Length of the primary index, zero for a fresh store
    pub fn primary_len(&self) -> Result<usize> {
        if !self.has_array(&self.primary_dim) {
            return Ok(0);
        }
        Ok(self
            .array_meta(&self.primary_dim)?
            .shape
            .first()
            .copied()
            .unwrap_or(0))
    }

    /// Timestamps of the primary index; unwritten slots are NaN
    pub fn primary_index(&self) -> Result<Vec<Timestamp>> {
        if !self.has_array(&self.primary_dim) {
            return Ok(Vec::new());
        }
        let data = self.read_all(&self.primary_dim)?;
        let view = data.expect_view::<f64>(&self.primary_dim)?;
        Ok(view.iter().copied().collect())
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    fn open_root(&self) -> Result<Group<dyn ReadableWritableListableStorageTraits>> {
        self.retry.run("read store metadata", || {
            Group::open(Arc::clone(&self.storage), ROOT_GROUP)
                .map_err(|e| zarr_error(ROOT_GROUP, e))
        })
    }

    pub fn attributes(&self) -> Result<StoreAttributes> {
        let group = self.open_root()?;
        Ok(StoreMeta::from_group_attributes(group.attributes())?.1)
    }

    /// Apply `update` to the attributes under the store lock and persist
    /// the result
    pub fn update_attributes<F>(&self, update: F) -> Result<StoreAttributes>
    where
        F: FnOnce(&mut StoreAttributes),
    {
        let _guard = self.lock_structure()?;
        let mut group = self.open_root()?;
        let (meta, mut attributes) = StoreMeta::from_group_attributes(group.attributes())?;
        update(&mut attributes);
        *group.attributes_mut() = meta.group_attributes(&attributes)?;
        self.retry.run("write store metadata", || {
            group.store_metadata().map_err(|e| zarr_error(ROOT_GROUP, e))
        })?;
        Ok(attributes)
    }
}

impl std::fmt::Debug for ChunkedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedStore")
            .field("root", &self.root)
            .field("primary_dim", &self.primary_dim)
            .field("ragged_dim", &self.ragged_dim)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_core::ChunkLayout;
    use ndarray::{array, Array2};
    use tempfile::TempDir;

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn open(dir: &TempDir) -> ChunkedStore {
        ChunkedStore::create_or_open(dir.path().join("test.fstore"), StoreConfig::for_testing())
            .unwrap()
    }

    #[test]
    fn test_create_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.fstore");
        {
            let store = ChunkedStore::create_or_open(&path, StoreConfig::for_testing()).unwrap();
            store
                .create_array("time", DataType::Float64, &dims(&["time"]), &[10])
                .unwrap();
        }
        let store = ChunkedStore::open(&path, StoreConfig::for_testing()).unwrap();
        assert_eq!(store.array_names().unwrap(), vec!["time".to_string()]);
        assert_eq!(store.primary_len().unwrap(), 10);
        assert_eq!(store.primary_dim(), "time");
        assert_eq!(store.ragged_dim(), Some("beam"));
    }

    #[test]
    fn test_open_missing_store() {
        let dir = TempDir::new().unwrap();
        let err = ChunkedStore::open(dir.path().join("nope"), StoreConfig::default()).unwrap_err();
        assert!(matches!(err, FathomError::StorageUnavailable { .. }));
    }

    #[test]
    fn test_path_is_a_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, b"not a store").unwrap();
        let err = ChunkedStore::create_or_open(&path, StoreConfig::default()).unwrap_err();
        assert!(matches!(err, FathomError::StorageUnavailable { .. }));
    }

    #[test]
    fn test_unwritten_cells_read_as_sentinel() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("flags", DataType::UInt8, &dims(&["time"]), &[9])
            .unwrap();
        let all = store.read_all("flags").unwrap();
        assert_eq!(all.count_no_data(), 9);
        assert!(!store.path().join("flags").join("c").exists());
    }

    #[test]
    fn test_region_round_trip_across_chunks() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("depth", DataType::Float32, &dims(&["time", "beam"]), &[10, 6])
            .unwrap();

        let block = Array2::from_shape_fn((5, 3), |(r, c)| (r * 10 + c) as f32).into_dyn();
        store
            .write_region("depth", &[3, 2], &TypedArray::from(block.clone()))
            .unwrap();

        let back = store.read_region("depth", &[3..8, 2..5]).unwrap();
        assert_eq!(back, TypedArray::from(block));

        let whole = store.read_all("depth").unwrap();
        assert_eq!(whole.count_no_data(), 60 - 15);
    }

    #[test]
    fn test_resize_rejects_shrink() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("time", DataType::Float64, &dims(&["time"]), &[5])
            .unwrap();
        store.resize("time", &[8]).unwrap();
        let err = store.resize("time", &[3]).unwrap_err();
        assert!(matches!(err, FathomError::ShrinkRejected { current: 8, requested: 3, .. }));
    }

    #[test]
    fn test_resize_keeps_data_and_pads_sentinel() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("count", DataType::Int32, &dims(&["time"]), &[3])
            .unwrap();
        store
            .write_region("count", &[0], &TypedArray::from(array![1i32, 2, 3].into_dyn()))
            .unwrap();
        store.resize("count", &[6]).unwrap();

        let out = store.read_all("count").unwrap();
        let values: Vec<i32> = out.view::<i32>().unwrap().iter().copied().collect();
        assert_eq!(values, vec![1, 2, 3, i32::MAX, i32::MAX, i32::MAX]);
    }

    #[test]
    fn test_write_slice_indices_and_padding() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("sv", DataType::Float32, &dims(&["time", "beam"]), &[6, 4])
            .unwrap();

        // two beams wide, store holds four; scattered target rows
        let values = TypedArray::from(array![[1.0f32, 1.5], [2.0, 2.5], [3.0, 3.5]].into_dyn());
        store
            .write_slice("sv", &Placement::Indices(vec![5, 0, 1]), &values)
            .unwrap();

        let out = store.read_all("sv").unwrap();
        let view = out.view::<f32>().unwrap();
        assert_eq!(view[[5, 0]], 1.0);
        assert_eq!(view[[0, 1]], 2.5);
        assert_eq!(view[[1, 0]], 3.0);
        assert!(view[[1, 3]].is_nan());
        assert!(view[[2, 0]].is_nan());
    }

    #[test]
    fn test_write_slice_secondary_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("xyz_offset", DataType::Float64, &dims(&["time", "xyz"]), &[4, 3])
            .unwrap();
        let values = TypedArray::from(Array2::<f64>::zeros((2, 2)).into_dyn());
        let err = store
            .write_slice("xyz_offset", &Placement::Contiguous(0..2), &values)
            .unwrap_err();
        assert!(matches!(err, FathomError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_write_region_type_checked() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("time", DataType::Float64, &dims(&["time"]), &[2])
            .unwrap();
        let err = store
            .write_region("time", &[0], &TypedArray::from(array![1i64, 2].into_dyn()))
            .unwrap_err();
        assert!(matches!(err, FathomError::DataTypeMismatch { .. }));
    }

    #[test]
    fn test_read_out_of_bounds() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("time", DataType::Float64, &dims(&["time"]), &[4])
            .unwrap();
        let err = store.read("time", 2..6).unwrap_err();
        assert!(matches!(err, FathomError::OutOfBounds { end: 6, len: 4, .. }));
    }

    #[test]
    fn test_expand_ragged_dimension() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("depth", DataType::Float32, &dims(&["time", "beam"]), &[2, 3])
            .unwrap();
        store
            .create_array("time", DataType::Float64, &dims(&["time"]), &[2])
            .unwrap();
        store.regenerate_coordinate("beam", DataType::Int32, 3).unwrap();

        let resized = store.expand_ragged_dimension(5).unwrap();
        assert_eq!(resized, vec!["depth".to_string()]);
        assert_eq!(store.array_meta("depth").unwrap().shape, vec![2, 5]);
        assert_eq!(store.array_meta("time").unwrap().shape, vec![2]);

        let beam = store.read_all("beam").unwrap();
        let beams: Vec<i32> = beam.view::<i32>().unwrap().iter().copied().collect();
        assert_eq!(beams, vec![0, 1, 2, 3, 4]);
        assert_eq!(store.dimension_extent("beam").unwrap(), Some(5));
    }

    #[test]
    fn test_create_array_is_idempotent_for_same_schema() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let a = store
            .create_array("time", DataType::Float64, &dims(&["time"]), &[4])
            .unwrap();
        let b = store
            .create_array("time", DataType::Float64, &dims(&["time"]), &[9])
            .unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            store.create_array("time", DataType::Int64, &dims(&["time"]), &[4]),
            Err(FathomError::DataTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_chunk_layout_applied() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::default().with_layout(ChunkLayout::ping());
        let store = ChunkedStore::create_or_open(dir.path().join("p.fstore"), config).unwrap();
        let meta = store
            .create_array("depth", DataType::Float32, &dims(&["time", "beam"]), &[0, 256])
            .unwrap();
        assert_eq!(meta.chunk_shape, vec![1000, 400]);
    }

    #[test]
    fn test_attributes_update_persist() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .update_attributes(|attrs| {
                attrs.insert("sonar".to_string(), "em2040".into());
            })
            .unwrap();
        let attrs = store.attributes().unwrap();
        assert_eq!(attrs.len(), 1);
        assert!(attrs.contains_key("sonar"));
    }

    #[test]
    fn test_delete_array() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("tvu", DataType::Float32, &dims(&["time"]), &[2])
            .unwrap();
        store.delete_array("tvu").unwrap();
        assert!(!store.has_array("tvu"));
        assert!(matches!(
            store.delete_array("tvu"),
            Err(FathomError::ArrayNotFound(_))
        ));
    }

    #[test]
    fn test_zarr_metadata_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("depth", DataType::Float32, &dims(&["time", "beam"]), &[3, 2])
            .unwrap();
        store.resize("depth", &[7, 2]).unwrap();

        let bytes = fs::read(store.path().join("depth").join("zarr.json")).unwrap();
        let meta: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(meta["shape"], serde_json::json!([7, 2]));
        assert_eq!(meta["fill_value"], serde_json::json!("NaN"));
        assert_eq!(
            meta["attributes"]["_dimension_names"],
            serde_json::json!(["time", "beam"])
        );

        let root = fs::read(store.path().join("zarr.json")).unwrap();
        let root: serde_json::Value = serde_json::from_slice(&root).unwrap();
        assert_eq!(root["attributes"]["_fathom"]["primary_dim"], "time");
    }

    #[test]
    fn test_text_array_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .create_array("mode", DataType::Text, &dims(&["time"]), &[4])
            .unwrap();
        let values = ndarray::arr1(&["deep".to_string(), "shallow".to_string()]).into_dyn();
        store
            .write_region("mode", &[1], &TypedArray::from(values))
            .unwrap();

        let out = store.read_all("mode").unwrap();
        let view = out.view::<String>().unwrap();
        assert_eq!(view[[1]], "deep");
        assert_eq!(view[[2]], "shallow");
        assert_eq!(out.count_no_data(), 2);
    }

    #[test]
    fn test_primary_index_of_fresh_store() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.primary_index().unwrap().is_empty());
        assert_eq!(store.primary_len().unwrap(), 0);
    }
}
