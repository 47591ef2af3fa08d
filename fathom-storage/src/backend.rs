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

//! Survey backend: one chunked store per dataset under an output folder

use crate::coordinator::{CommitCoordinator, CommitResult};
use crate::executor::{executor_from_config, CommitExecutor};
use crate::store::ChunkedStore;
use fathom_core::{
    BackendConfig, Dataset, FathomError, IncomingChunk, Result, StoreAttributes, TypedArray,
};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

pub struct SurveyBackend {
    config: BackendConfig,
    coordinator: CommitCoordinator,
}

impl SurveyBackend {
    /// Backend with the executor selected by `config`
    pub fn new(config: BackendConfig) -> Result<Self> {
        let executor = executor_from_config(&config.executor)?;
        Ok(Self::with_executor(config, executor))
    }

    pub fn with_executor(config: BackendConfig, executor: Arc<dyn CommitExecutor>) -> Self {
        let coordinator = CommitCoordinator::new(executor, config.write_policy);
        Self {
            config,
            coordinator,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn store_path(&self, dataset: &Dataset) -> PathBuf {
        dataset.store_path(&self.config.output_folder)
    }

    fn create_store(&self, dataset: &Dataset) -> Result<Arc<ChunkedStore>> {
        let store = ChunkedStore::create_or_open(
            self.store_path(dataset),
            self.config.store_config(dataset),
        )?;
        Ok(Arc::new(store))
    }

    fn open_store(&self, dataset: &Dataset) -> Result<ChunkedStore> {
        ChunkedStore::open(self.store_path(dataset), self.config.store_config(dataset))
    }

    /// Commit a batch of chunks to `dataset`, creating its store if needed
    pub fn submit_chunks(
        &self,
        dataset: &Dataset,
        chunks: Vec<IncomingChunk>,
        attributes: Option<StoreAttributes>,
    ) -> Result<CommitResult> {
        let store = self.create_store(dataset)?;
        tracing::debug!(dataset = %dataset, chunks = chunks.len(), "Submitting chunks");
        self.coordinator.submit(store, chunks, attributes)
    }

    /// Records `range` of `array` in `dataset`
    pub fn read(&self, dataset: &Dataset, array: &str, range: Range<usize>) -> Result<TypedArray> {
        self.open_store(dataset)?.read(array, range)
    }

    pub fn read_all(&self, dataset: &Dataset, array: &str) -> Result<TypedArray> {
        self.open_store(dataset)?.read_all(array)
    }

    pub fn array_names(&self, dataset: &Dataset) -> Result<Vec<String>> {
        self.open_store(dataset)?.array_names()
    }

    pub fn read_attributes(&self, dataset: &Dataset) -> Result<StoreAttributes> {
        self.open_store(dataset)?.attributes()
    }

    /// Merge `attributes` into the store of `dataset`
    pub fn write_attributes(&self, dataset: &Dataset, attributes: StoreAttributes) -> Result<()> {
        let store = self.create_store(dataset)?;
        self.coordinator.merge_attributes(&store, Some(attributes))
    }

    /// Remove one attribute key; returns whether it existed
    pub fn remove_attribute(&self, dataset: &Dataset, key: &str) -> Result<bool> {
        let store = self.open_store(dataset)?;
        let mut removed = false;
        store.update_attributes(|attrs| removed = attrs.remove(key).is_some())?;
        Ok(removed)
    }

    /// Delete one array from `dataset`. The primary index cannot be
    /// deleted while other record arrays depend on it.
    pub fn delete_variable(&self, dataset: &Dataset, array: &str) -> Result<()> {
        let store = self.open_store(dataset)?;
        if array == store.primary_dim() && store.array_names()?.len() > 1 {
            return Err(FathomError::invalid_chunk(format!(
                "'{}' is the primary index of {}",
                array, dataset
            )));
        }
        store.delete_array(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalExecutor;
    use fathom_core::attributes_from_json;
    use serde_json::json;
    use tempfile::TempDir;

    fn backend(dir: &TempDir) -> SurveyBackend {
        SurveyBackend::with_executor(BackendConfig::new(dir.path()), Arc::new(LocalExecutor))
    }

    #[test]
    fn test_attributes_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        backend
            .write_attributes(
                &Dataset::Navigation,
                attributes_from_json(json!({"sources": ["a.all"]})),
            )
            .unwrap();
        backend
            .write_attributes(
                &Dataset::Navigation,
                attributes_from_json(json!({"sources": ["b.all"]})),
            )
            .unwrap();

        let attrs = backend.read_attributes(&Dataset::Navigation).unwrap();
        assert_eq!(attrs["sources"].as_list().map(|l| l.len()), Some(2));

        assert!(backend
            .remove_attribute(&Dataset::Navigation, "sources")
            .unwrap());
        assert!(!backend
            .remove_attribute(&Dataset::Navigation, "sources")
            .unwrap());
    }

    #[test]
    fn test_read_missing_dataset() {
        let dir = TempDir::new().unwrap();
        let err = backend(&dir)
            .read_attributes(&Dataset::Attitude)
            .unwrap_err();
        assert!(matches!(err, FathomError::StorageUnavailable { .. }));
    }
}
