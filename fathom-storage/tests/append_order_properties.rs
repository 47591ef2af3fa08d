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

//! Whatever order disjoint runs of records arrive in, the store ends up
//! with one sorted index and data aligned to it.

use fathom_core::{IncomingChunk, StoreConfig, TypedArray, WritePolicy};
use fathom_storage::{ChunkedStore, CommitCoordinator, LocalExecutor};
use ndarray::Array1;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

const BATCHES: usize = 3;

fn chunk(index: Vec<f64>) -> IncomingChunk {
    let roll: Array1<i32> = index.iter().map(|&t| t as i32 * 3).collect();
    IncomingChunk::new(index)
        .unwrap()
        .with_variable("roll", ["time"], TypedArray::from(roll.into_dyn()))
        .unwrap()
}

/// Disjoint runs as (timestamps, batch) pairs
fn disjoint_runs() -> impl Strategy<Value = Vec<(Vec<f64>, usize)>> {
    prop::collection::vec((1usize..6, 1usize..4, 0..BATCHES), 1..10).prop_map(|specs| {
        let mut cursor = 0usize;
        specs
            .into_iter()
            .map(|(len, gap, batch)| {
                let run = (cursor..cursor + len).map(|t| t as f64).collect();
                cursor += len + gap;
                (run, batch)
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_index_sorted_and_aligned(
        runs in disjoint_runs(),
        order in Just((0..BATCHES).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            ChunkedStore::create_or_open(dir.path().join("p.fstore"), StoreConfig::for_testing())
                .unwrap(),
        );
        let coordinator = CommitCoordinator::new(Arc::new(LocalExecutor), WritePolicy::Parallel);

        for batch in order {
            // reversed so the coordinator has to sort
            let chunks: Vec<IncomingChunk> = runs
                .iter()
                .rev()
                .filter(|(_, b)| *b == batch)
                .map(|(run, _)| chunk(run.clone()))
                .collect();
            coordinator.submit(store.clone(), chunks, None).unwrap();
        }

        let mut expected: Vec<f64> = runs.iter().flat_map(|(run, _)| run.clone()).collect();
        expected.sort_by(f64::total_cmp);
        prop_assert_eq!(store.primary_index().unwrap(), expected.clone());

        let roll = store.read_all("roll").unwrap();
        let roll: Vec<i32> = roll.view::<i32>().unwrap().iter().copied().collect();
        let aligned: Vec<i32> = expected.iter().map(|&t| t as i32 * 3).collect();
        prop_assert_eq!(roll, aligned);
    }
}
