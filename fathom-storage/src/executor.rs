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

//! Executors for chunk commits.
//!
//! The coordinator hands an executor a set of independent jobs and waits
//! for all of them; how they run (inline or on worker threads) is chosen
//! once, from configuration.

use crossbeam_channel::{unbounded, Receiver, Sender};
use fathom_core::{ExecutorConfig, ExecutorKind, FathomError, Result};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of commit work
pub type CommitJob = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

pub trait CommitExecutor: Send + Sync {
    /// Run `jobs` to completion; results come back in submission order
    fn execute(&self, jobs: Vec<CommitJob>) -> Vec<Result<()>>;

    fn name(&self) -> &'static str;
}

fn run_job(job: CommitJob) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(result) => result,
        Err(_) => Err(FathomError::Io(io::Error::new(
            io::ErrorKind::Other,
            "commit job panicked",
        ))),
    }
}

/// Runs every job on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalExecutor;

impl CommitExecutor for LocalExecutor {
    fn execute(&self, jobs: Vec<CommitJob>) -> Vec<Result<()>> {
        jobs.into_iter().map(run_job).collect()
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct Task {
    slot: usize,
    job: CommitJob,
    reply: Sender<(usize, Result<()>)>,
}

/// Fixed pool of worker threads fed through an MPMC channel
pub struct ThreadPoolExecutor {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    /// Spawn `workers` threads; zero means one per available core
    pub fn new(workers: usize) -> Result<Self> {
        let size = if workers == 0 {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            workers
        };

        let (sender, receiver) = unbounded::<Task>();
        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let receiver: Receiver<Task> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("fathom-commit-{}", i))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        let result = run_job(task.job);
                        // the submitter may have given up; nothing to do then
                        let _ = task.reply.send((task.slot, result));
                    }
                })?;
            handles.push(handle);
        }
        tracing::debug!(workers = size, "Started commit pool");

        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl CommitExecutor for ThreadPoolExecutor {
    fn execute(&self, jobs: Vec<CommitJob>) -> Vec<Result<()>> {
        let count = jobs.len();
        let Some(sender) = self.sender.as_ref() else {
            return LocalExecutor.execute(jobs);
        };

        let (reply_tx, reply_rx) = unbounded();
        let mut results: Vec<Option<Result<()>>> = (0..count).map(|_| None).collect();

        for (slot, job) in jobs.into_iter().enumerate() {
            let task = Task {
                slot,
                job,
                reply: reply_tx.clone(),
            };
            if let Err(rejected) = sender.send(task) {
                // pool is gone; run the job here instead
                let task = rejected.into_inner();
                results[slot] = Some(run_job(task.job));
            }
        }
        drop(reply_tx);

        while let Ok((slot, result)) = reply_rx.recv() {
            results[slot] = Some(result);
        }

        results
            .into_iter()
            .map(|r| {
                r.unwrap_or_else(|| {
                    Err(FathomError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        "commit worker exited without reporting",
                    )))
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "thread_pool"
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Build the executor selected by `config`
pub fn executor_from_config(config: &ExecutorConfig) -> Result<Arc<dyn CommitExecutor>> {
    Ok(match config.kind {
        ExecutorKind::Local => Arc::new(LocalExecutor),
        ExecutorKind::ThreadPool => Arc::new(ThreadPoolExecutor::new(config.workers)?),
    })
}
