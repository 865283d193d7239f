//! Bounded parallel execution of independent file tasks.
//!
//! Every unit of work is spawned up front and waits for a semaphore permit,
//! so at most `workers` blocking file operations run at once. Results come
//! back to the caller in completion order; one task failing has no effect on
//! its siblings. Once the cancellation token fires, tasks still waiting for a
//! permit give up, while tasks already running are left to finish.

use crate::utils::{BackupError, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Results of one parallel phase
#[derive(Debug)]
pub struct TaskReport<T> {
    /// Outcome of every task that ran, in completion order
    pub results: Vec<Result<T>>,
    /// Tasks never started because the run was cancelled
    pub cancelled: usize,
}

/// Worker pool shared by the digest, copy and verify phases
#[derive(Debug, Clone)]
pub struct TaskRunner {
    workers: usize,
    cancel: CancellationToken,
}

impl TaskRunner {
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.clamp(1, Semaphore::MAX_PERMITS),
            cancel,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every item with bounded concurrency.
    ///
    /// `progress` is called after each task settles with `(settled, total)`.
    pub async fn run<I, T, F, P>(&self, items: Vec<I>, work: F, mut progress: P) -> TaskReport<T>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Result<T> + Send + Sync + 'static,
        P: FnMut(usize, usize),
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let work = Arc::new(work);
        let mut tasks = JoinSet::new();

        for item in items {
            let sem = Arc::clone(&semaphore);
            let work = Arc::clone(&work);
            let cancel = self.cancel.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    permit = sem.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(e) => {
                            let error = BackupError::Task(format!("Semaphore closed: {}", e));
                            return Some(Err(error));
                        }
                    },
                };

                let result = tokio::task::spawn_blocking(move || work(item))
                    .await
                    .unwrap_or_else(|e| Err(BackupError::Task(e.to_string())));

                drop(permit);
                Some(result)
            });
        }

        let mut report = TaskReport {
            results: Vec::with_capacity(total),
            cancelled: 0,
        };
        let mut settled = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => report.results.push(result),
                Ok(None) => report.cancelled += 1,
                Err(e) => report.results.push(Err(BackupError::Task(e.to_string()))),
            }
            settled += 1;
            progress(settled, total);
        }

        if report.cancelled > 0 {
            debug!("{} of {} tasks skipped after cancellation", report.cancelled, total);
        }

        report
    }
}
