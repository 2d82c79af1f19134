//! Process-wide background worker pool. All cache instances share it, all
//! completions run on it. Created lazily on first use and never torn down.

use log::error;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

static SHARED: Lazy<WorkerPool> = Lazy::new(|| WorkerPool::new(default_workers()));

fn default_workers() -> usize {
    thread::available_parallelism().map_or(2, |n| n.get().min(4))
}

/// The shared pool backing every cache instance in the process.
pub fn shared() -> &'static WorkerPool {
    &SHARED
}

pub struct WorkerPool {
    tx: Sender<Job>,
}

impl WorkerPool {
    fn new(workers: usize) -> Self {
        let (tx, rx) = channel::<Job>();
        let rx: Arc<Mutex<Receiver<Job>>> = Arc::new(Mutex::new(rx));
        for n in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let spawned = thread::Builder::new()
                .name(format!("tiercache-worker-{n}"))
                .spawn(move || {
                    loop {
                        let job = rx.lock().recv();
                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    }
                });
            if let Err(e) = spawned {
                error!("failed to spawn worker thread {n}: {e}");
            }
        }
        Self { tx }
    }

    /// Run `job` on a background worker. Jobs are executed in submission
    /// order per worker, with no ordering across workers.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Workers live for the process lifetime, so the channel never closes.
        let _ = self.tx.send(Box::new(job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn jobs_run_off_the_caller_thread() {
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        shared().execute(move || {
            let _ = tx.send(thread::current().id());
        });
        let worker = rx.recv().expect("job ran");
        assert_ne!(caller, worker);
    }

    #[test]
    fn many_jobs_all_complete() {
        let (tx, rx) = mpsc::channel();
        for i in 0..64 {
            let tx = tx.clone();
            shared().execute(move || {
                let _ = tx.send(i);
            });
        }
        drop(tx);
        let mut seen: Vec<i32> = rx.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
    }
}
