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

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fathom_core::{ChunkLayout, IncomingChunk, StoreConfig, TypedArray, WritePolicy};
use fathom_storage::{plan_writes, ChunkedStore, CommitCoordinator, LocalExecutor};
use fathom_telemetry::{init_logging, LogConfig};
use ndarray::Array2;
use std::sync::Arc;
use tempfile::tempdir;

fn bench_plan_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_writes");

    for existing_len in [10_000usize, 100_000, 1_000_000].iter() {
        let existing: Vec<f64> = (0..*existing_len).map(|t| (t * 2) as f64).collect();
        // one prepend, one interior insert, one append
        let head: Vec<f64> = (0..100).map(|t| -1000.0 + t as f64).collect();
        let middle: Vec<f64> = vec![(*existing_len) as f64 + 1.0];
        let tail: Vec<f64> = (0..100).map(|t| (existing_len * 2 + t) as f64).collect();

        group.throughput(Throughput::Elements(*existing_len as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(existing_len),
            existing_len,
            |b, _| {
                b.iter(|| {
                    let chunks = [head.as_slice(), middle.as_slice(), tail.as_slice()];
                    plan_writes(black_box(&existing), black_box(&chunks)).unwrap()
                });
            },
        );
    }

    group.finish();
}

fn ping_chunk(start: usize, len: usize) -> IncomingChunk {
    let index: Vec<f64> = (start..start + len).map(|t| t as f64).collect();
    let depth = Array2::<f32>::from_elem((len, 64), 42.0);
    IncomingChunk::new(index)
        .unwrap()
        .with_variable("depth", ["time", "beam"], TypedArray::from(depth.into_dyn()))
        .unwrap()
}

fn bench_prepend_push_forward(c: &mut Criterion) {
    // per-commit info events would drown criterion output
    let logging = LogConfig {
        default_directive: "warn".to_string(),
        ..LogConfig::pretty()
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("logging disabled: {e}");
    }

    let mut group = c.benchmark_group("prepend_push_forward");
    group.sample_size(10);

    for existing_len in [1_000usize, 10_000].iter() {
        group.throughput(Throughput::Elements(*existing_len as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(existing_len),
            existing_len,
            |b, &existing_len| {
                b.iter_with_setup(
                    || {
                        let dir = tempdir().unwrap();
                        let config = StoreConfig::default().with_layout(ChunkLayout::uniform(1000));
                        let store = Arc::new(
                            ChunkedStore::create_or_open(dir.path().join("b.fstore"), config)
                                .unwrap(),
                        );
                        let coordinator =
                            CommitCoordinator::new(Arc::new(LocalExecutor), WritePolicy::Sequential);
                        coordinator
                            .submit(store.clone(), vec![ping_chunk(1_000_000, existing_len)], None)
                            .unwrap();
                        (dir, store, coordinator)
                    },
                    |(_dir, store, coordinator)| {
                        coordinator
                            .submit(store, vec![ping_chunk(0, 100)], None)
                            .unwrap();
                    },
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_plan_writes, bench_prepend_push_forward);
criterion_main!(benches);
