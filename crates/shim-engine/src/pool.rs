//! Work pool
//!
//! A fixed set of named worker threads fed by one crossbeam channel. Each
//! finished job reports back on a completion channel that only the engine
//! thread reads, so completions are observed in finish order.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use shim_sdk::sys::WorkFn;
use shim_sdk::WorkStatus;

use crate::error::EngineSetupResult;

/// Identifies one queued job.
pub type JobId = u64;

/// Job sent to a worker
struct Job {
    id: JobId,
    work: WorkFn,
}

/// Result sent back to the engine thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Job that finished
    pub id: JobId,
    /// How it finished
    pub status: WorkStatus,
}

/// Background threads running blocking work.
pub struct WorkPool {
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<Completion>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkPool {
    /// Start `size` worker threads
    pub fn new(size: usize) -> EngineSetupResult<Self> {
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (done_tx, done_rx) = channel::unbounded::<Completion>();

        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let rx = job_rx.clone();
            let tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("shim-worker-{}", i))
                .spawn(move || Self::worker_loop(rx, tx))?;
            handles.push(handle);
        }
        log::debug!("work pool started with {} threads", size);

        Ok(Self {
            job_tx: Some(job_tx),
            done_rx,
            handles,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queue a job; returns `false` if the pool is shut down
    pub fn submit(&self, id: JobId, work: WorkFn) -> bool {
        match &self.job_tx {
            Some(tx) => tx.send(Job { id, work }).is_ok(),
            None => false,
        }
    }

    /// Wait for the next completion
    pub fn recv(&self) -> Option<Completion> {
        self.done_rx.recv().ok()
    }

    /// Next completion, if one is ready
    pub fn try_recv(&self) -> Option<Completion> {
        match self.done_rx.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop accepting jobs and join the workers once the queue drains
    pub fn shutdown(&mut self) {
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("work pool thread exited abnormally");
            }
        }
    }

    fn worker_loop(jobs: Receiver<Job>, done: Sender<Completion>) {
        while let Ok(Job { id, work }) = jobs.recv() {
            log::trace!("job {} started", id);
            let status = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(status) => status,
                Err(_) => WorkStatus::Panicked,
            };
            if done.send(Completion { id, status }).is_err() {
                break;
            }
        }
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_complete() {
        let pool = WorkPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for id in 0..4 {
            let counter = counter.clone();
            assert!(pool.submit(
                id,
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    WorkStatus::Completed
                })
            ));
        }

        let mut ids: Vec<JobId> = (0..4).map(|_| pool.recv().unwrap().id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_panicking_job_reported() {
        let pool = WorkPool::new(1).unwrap();
        pool.submit(7, Box::new(|| panic!("boom")));
        let completion = pool.recv().unwrap();
        assert_eq!(completion.id, 7);
        assert_eq!(completion.status, WorkStatus::Panicked);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let mut pool = WorkPool::new(1).unwrap();
        pool.shutdown();
        assert!(!pool.submit(1, Box::new(|| WorkStatus::Completed)));
        assert_eq!(pool.size(), 0);
    }
}
