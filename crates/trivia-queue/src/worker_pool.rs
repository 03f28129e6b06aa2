use futures_util::future::{AssertUnwindSafe, FutureExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Sender};
use tokio::task::JoinHandle;
use tracing::warn;

/// A unit of work submitted to the [`WorkerPool`]: a boxed, owned future.
pub type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

/// A fixed number of cooperative executors draining queued fan-out jobs
/// with panic isolation (spec.md §4.4, C4).
///
/// `submit` never blocks: on a full buffer it returns `false` and the
/// caller is expected to execute the job inline as a fallback, matching the
/// spec's documented degrade-gracefully contract.
pub struct WorkerPool {
    tx: Sender<BoxedJob>,
    counters: Arc<Counters>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` loop tasks draining a buffer sized
    /// `10 * worker_count`, per spec.md §4.4.
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::channel(worker_count * 10);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let handles = (0..worker_count)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let counters = Arc::clone(&counters);
                tokio::spawn(Self::run_worker(id, rx, counters))
            })
            .collect();

        WorkerPool {
            tx,
            counters,
            handles,
        }
    }

    async fn run_worker(
        id: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<BoxedJob>>>,
        counters: Arc<Counters>,
    ) {
        loop {
            let job = {
                let mut guard = rx.lock().await;
                guard.recv().await
            };

            let Some(job) = job else {
                break;
            };

            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                warn!(worker_id = id, "fan-out job panicked; worker continuing");
            }
        }
    }

    /// Attempt a non-blocking enqueue. Returns `true` if accepted.
    pub fn submit(&self, job: BoxedJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.counters.submitted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panicked(&self) -> u64 {
        self.counters.panicked.load(Ordering::Relaxed)
    }

    /// Abort all worker loops. Used during `Hub::close`.
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn submitted_jobs_run() {
        let pool = WorkerPool::new(2);
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            let accepted = pool.submit(Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
            assert!(accepted);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        assert_eq!(pool.submitted(), 10);
    }

    #[tokio::test]
    async fn a_panicking_job_does_not_take_down_the_worker() {
        let pool = WorkerPool::new(1);

        assert!(pool.submit(Box::pin(async {
            panic!("boom");
        })));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.panicked(), 1);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        assert!(pool.submit(Box::pin(async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_buffer_rejects_non_blockingly() {
        // Zero workers draining, tiny buffer: the third submit must be
        // rejected rather than block.
        let (tx, _rx) = mpsc::channel::<BoxedJob>(2);
        assert!(tx.try_send(Box::pin(async {})).is_ok());
        assert!(tx.try_send(Box::pin(async {})).is_ok());
        assert!(tx.try_send(Box::pin(async {})).is_err());
    }
}
