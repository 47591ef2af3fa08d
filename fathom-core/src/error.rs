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

//! Error types shared by every fathom crate

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, FathomError>;

/// Errors raised while planning, committing or reading a chunked store
#[derive(Debug, Error)]
pub enum FathomError {
    /// The incoming chunks cannot be reconciled with the existing index
    #[error("Planning error: {0}")]
    Planning(String),

    /// Transient contention persisted past the retry budget
    #[error("Lock contention on {operation}: gave up after {attempts} attempts")]
    LockContention { operation: String, attempts: u32 },

    /// Store path missing, unwritable or not a store
    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    /// Incoming dimensions do not line up with the stored array
    #[error("Shape mismatch for '{array}': expected {expected}, found {found}")]
    ShapeMismatch {
        array: String,
        expected: String,
        found: String,
    },

    /// Element type differs from the stored array
    #[error("Data type mismatch for '{array}': stored {stored}, incoming {incoming}")]
    DataTypeMismatch {
        array: String,
        stored: String,
        incoming: String,
    },

    /// Arrays only ever grow
    #[error("Refusing to shrink '{array}' axis {axis} from {current} to {requested}")]
    ShrinkRejected {
        array: String,
        axis: usize,
        current: usize,
        requested: usize,
    },

    /// The store changed between planning and the structural step
    #[error("Stale write plan: planned against {planned} records, store now holds {actual}")]
    StalePlan { planned: usize, actual: usize },

    /// A batch attempted a second resize / push-forward phase
    #[error("Structural mutation already applied for this batch")]
    StructuralMutationRepeated,

    /// Malformed incoming chunk
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    /// Dataset name is not one of the known survey datasets
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// Named array does not exist in the store
    #[error("Array not found: {0}")]
    ArrayNotFound(String),

    /// Read range past the end of the primary dimension
    #[error("Range {start}..{end} out of bounds for '{array}' (length {len})")]
    OutOfBounds {
        array: String,
        start: usize,
        end: usize,
        len: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored array metadata or chunk data could not be decoded
    #[error("Array format error for '{array}': {reason}")]
    ArrayFormat { array: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FathomError {
    pub fn planning(msg: impl Into<String>) -> Self {
        FathomError::Planning(msg.into())
    }

    pub fn invalid_chunk(msg: impl Into<String>) -> Self {
        FathomError::InvalidChunk(msg.into())
    }

    pub fn shape_mismatch(
        array: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        FathomError::ShapeMismatch {
            array: array.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Whether the failure is worth retrying with backoff.
    ///
    /// Lock files held by another writer surface as `WouldBlock`; network
    /// and virus-scanner interference on shared drives surfaces as
    /// `PermissionDenied` on an otherwise writable store.
    pub fn is_transient(&self) -> bool {
        match self {
            FathomError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::PermissionDenied
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for FathomError {
    fn from(e: serde_json::Error) -> Self {
        FathomError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for FathomError {
    fn from(e: toml::de::Error) -> Self {
        FathomError::Config(e.to_string())
    }
}

impl From<ndarray::ShapeError> for FathomError {
    fn from(e: ndarray::ShapeError) -> Self {
        FathomError::Serialization(format!("shape error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let busy = FathomError::Io(io::Error::new(io::ErrorKind::WouldBlock, "locked"));
        assert!(busy.is_transient());

        let denied = FathomError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "av scan"));
        assert!(denied.is_transient());

        let missing = FathomError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!missing.is_transient());

        assert!(!FathomError::planning("bad").is_transient());
        assert!(!FathomError::StructuralMutationRepeated.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = FathomError::StalePlan {
            planned: 10,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "Stale write plan: planned against 10 records, store now holds 12"
        );

        let err = FathomError::shape_mismatch("sv", "[time, beam]", "[beam, time]");
        assert!(err.to_string().contains("'sv'"));
    }
}
