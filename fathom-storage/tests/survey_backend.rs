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

//! Dataset routing and maintenance through the survey backend

use fathom_core::{
    BackendConfig, ChunkLayout, DataType, Dataset, FathomError, IncomingChunk, TypedArray, WritePolicy,
};
use fathom_storage::SurveyBackend;
use ndarray::{Array1, Array2};
use tempfile::TempDir;

fn config(dir: &TempDir) -> BackendConfig {
    let mut config = BackendConfig::new(dir.path());
    config.executor.workers = 2;
    config.ping_layout = ChunkLayout::uniform(8);
    config.navigation_layout = ChunkLayout::uniform(8);
    config.attitude_layout = ChunkLayout::uniform(8);
    config
}

fn navigation(index: Vec<f64>) -> IncomingChunk {
    let latitude: Array1<f64> = index.iter().map(|t| 47.0 + t / 1000.0).collect();
    IncomingChunk::new(index)
        .unwrap()
        .with_variable("latitude", ["time"], TypedArray::from(latitude.into_dyn()))
        .unwrap()
}

fn pings(index: Vec<f64>, beams: usize) -> IncomingChunk {
    let depth = Array2::<f32>::from_elem((index.len(), beams), 12.5);
    IncomingChunk::new(index)
        .unwrap()
        .with_variable("depth", ["time", "beam"], TypedArray::from(depth.into_dyn()))
        .unwrap()
        .with_variable("beam", ["beam"], TypedArray::arange(DataType::Int64, beams))
        .unwrap()
}

#[test]
fn test_datasets_map_to_separate_stores() {
    let dir = TempDir::new().unwrap();
    let backend = SurveyBackend::new(config(&dir)).unwrap();
    let sonar = Dataset::parse("ping", Some("40111")).unwrap();

    backend
        .submit_chunks(
            &sonar,
            vec![pings(vec![0.0, 1.0, 2.0], 5), pings(vec![3.0, 4.0], 5)],
            None,
        )
        .unwrap();
    backend
        .submit_chunks(&Dataset::Navigation, vec![navigation(vec![0.5, 1.5])], None)
        .unwrap();

    assert!(dir.path().join("ping_40111.fstore").is_dir());
    assert!(dir.path().join("navigation.fstore").is_dir());
    assert!(!dir.path().join("attitude.fstore").exists());

    let depth = backend.read(&sonar, "depth", 1..4).unwrap();
    assert_eq!(depth.shape(), &[3, 5]);
    let time = backend.read_all(&Dataset::Navigation, "time").unwrap();
    assert_eq!(
        time.view::<f64>().unwrap().iter().copied().collect::<Vec<_>>(),
        vec![0.5, 1.5]
    );
    assert!(backend
        .array_names(&Dataset::Navigation)
        .unwrap()
        .contains(&"latitude".to_string()));
}

#[test]
fn test_delete_variable_keeps_index() {
    let dir = TempDir::new().unwrap();
    let backend = SurveyBackend::new(config(&dir)).unwrap();
    backend
        .submit_chunks(&Dataset::Attitude, vec![navigation(vec![1.0, 2.0])], None)
        .unwrap();

    assert!(backend.delete_variable(&Dataset::Attitude, "time").is_err());
    backend.delete_variable(&Dataset::Attitude, "latitude").unwrap();
    assert_eq!(
        backend.array_names(&Dataset::Attitude).unwrap(),
        vec!["time".to_string()]
    );
    assert!(matches!(
        backend.delete_variable(&Dataset::Attitude, "latitude"),
        Err(FathomError::ArrayNotFound(_))
    ));
}

#[test]
fn test_backend_from_toml() {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        r#"
output_folder = "{}"
write_policy = "sequential"
max_push_band = 3

[executor]
kind = "local"
"#,
        dir.path().display().to_string().replace('\\', "/")
    );
    let config = BackendConfig::from_toml_str(&toml).unwrap();
    assert_eq!(config.write_policy, WritePolicy::Sequential);

    let backend = SurveyBackend::new(config).unwrap();
    let nav = Dataset::PostProcessedNavigation;
    backend
        .submit_chunks(&nav, vec![navigation((10..20).map(f64::from).collect())], None)
        .unwrap();
    let result = backend
        .submit_chunks(&nav, vec![navigation(vec![1.0, 2.0])], None)
        .unwrap();
    assert_eq!(result.final_size, 12);
    assert_eq!(result.pushes_applied, 1);

    let latitude = backend.read(&nav, "latitude", 0..3).unwrap();
    let latitude: Vec<f64> = latitude.view::<f64>().unwrap().iter().copied().collect();
    let expected: Vec<f64> = [1.0, 2.0, 10.0].iter().map(|t| 47.0 + t / 1000.0).collect();
    assert_eq!(latitude, expected);
}
