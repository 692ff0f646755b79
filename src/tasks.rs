//! Task submitters for orchestrator work.

use crate::backend::{Task, TaskSubmitter};

/// Runs every task immediately on the calling thread. Continuations still
/// go through the context's channel, so ordering matches the threaded path.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineSubmitter;

impl TaskSubmitter for InlineSubmitter {
    fn submit_background(&self, task: Task) {
        task();
    }

    fn submit_and_wake_many(&self, tasks: Vec<Task>) {
        for task in tasks {
            task();
        }
    }
}

#[cfg(feature = "parallel")]
pub use self::pool::ThreadPoolSubmitter;

#[cfg(feature = "parallel")]
mod pool {
    use super::*;
    use crate::error::{AssetError, Result};
    use crossbeam::channel::{unbounded, Sender};
    use rayon::{ThreadPool, ThreadPoolBuilder};
    use std::thread::JoinHandle;

    /// Background units run one at a time, in submission order, on a single
    /// long-lived "asset-loader" thread. Groups woken with
    /// `submit_and_wake_many` run on a rayon pool. Units block on the pool,
    /// so the two never share threads.
    pub struct ThreadPoolSubmitter {
        pool: ThreadPool,
        loader: Option<Sender<Task>>,
        handle: Option<JoinHandle<()>>,
    }

    impl ThreadPoolSubmitter {
        pub fn new(worker_threads: usize) -> Result<Self> {
            let pool = ThreadPoolBuilder::new()
                .num_threads(worker_threads.max(1))
                .thread_name(|i| format!("asset-worker-{i}"))
                .build()
                .map_err(|e| AssetError::Config(format!("Failed to build worker pool: {e}")))?;

            let (sender, receiver) = unbounded::<Task>();
            let handle = std::thread::Builder::new()
                .name("asset-loader".to_string())
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        task();
                    }
                    tracing::debug!("asset loader thread exiting");
                })
                .map_err(|e| AssetError::Config(format!("Failed to spawn loader thread: {e}")))?;

            Ok(Self {
                pool,
                loader: Some(sender),
                handle: Some(handle),
            })
        }

        pub fn worker_threads(&self) -> usize {
            self.pool.current_num_threads()
        }
    }

    impl TaskSubmitter for ThreadPoolSubmitter {
        fn submit_background(&self, task: Task) {
            let sent = match &self.loader {
                Some(loader) => loader.send(task).is_ok(),
                None => false,
            };
            if !sent {
                tracing::error!("asset loader thread is gone; unit dropped");
            }
        }

        fn submit_and_wake_many(&self, tasks: Vec<Task>) {
            for task in tasks {
                self.pool.spawn(task);
            }
        }
    }

    impl Drop for ThreadPoolSubmitter {
        fn drop(&mut self) {
            // Closing the channel lets the loader drain what is queued and exit.
            self.loader.take();
            if let Some(handle) = self.handle.take() {
                // Dropped by a unit on the loader itself: it exits on its own.
                if handle.thread().id() == std::thread::current().id() {
                    return;
                }
                if handle.join().is_err() {
                    tracing::error!("asset loader thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_inline_runs_everything_before_returning() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Task> = (0..3)
            .map(|_| {
                let counter = counter.clone();
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as Task
            })
            .collect();
        InlineSubmitter.submit_and_wake_many(tasks);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_pool_runs_group_tasks() {
        let submitter = ThreadPoolSubmitter::new(2).unwrap();
        let wg = crossbeam::sync::WaitGroup::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Task> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                let wg = wg.clone();
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    drop(wg);
                }) as Task
            })
            .collect();
        submitter.submit_and_wake_many(tasks);
        wg.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_background_units_run_in_order_on_one_thread() {
        let submitter = ThreadPoolSubmitter::new(2).unwrap();
        let (sender, receiver) = crossbeam::channel::unbounded();
        for i in 0..16 {
            let sender = sender.clone();
            submitter.submit_background(Box::new(move || {
                let name = std::thread::current().name().map(str::to_string);
                sender.send((i, name)).unwrap();
            }));
        }
        drop(submitter);
        drop(sender);

        let ran: Vec<(usize, Option<String>)> = receiver.iter().collect();
        assert_eq!(ran.len(), 16);
        for (expected, (i, name)) in ran.into_iter().enumerate() {
            assert_eq!(i, expected);
            assert_eq!(name.as_deref(), Some("asset-loader"));
        }
    }
}
