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

//! Advisory file locks shared between threads and processes.
//!
//! Locks are taken on an open file handle, so two handles in the same
//! process contend exactly like two processes do.

use fathom_core::{FathomError, Result, RetryPolicy};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Exclusive lock released on drop
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Single attempt; a held lock surfaces as a transient `WouldBlock` error
    pub fn try_acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        if let Err(e) = file.try_lock_exclusive() {
            let contended = e.kind() == fs2::lock_contended_error().kind()
                || e.kind() == io::ErrorKind::WouldBlock;
            return Err(if contended {
                FathomError::Io(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("{} is held by another writer", path.display()),
                ))
            } else {
                FathomError::Io(e)
            });
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Retry [`LockGuard::try_acquire`] under `policy`
    pub fn acquire(path: &Path, policy: &RetryPolicy, operation: &str) -> Result<Self> {
        policy.run(operation, || Self::try_acquire(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}
