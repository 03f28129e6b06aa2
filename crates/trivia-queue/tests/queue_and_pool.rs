//! The priority queue and worker pool are tested in isolation inline; this
//! exercises them together the way [`trivia_gateway`]'s shard dispatch loop
//! actually combines them: jobs submitted to the pool drain a shared
//! queue in priority order, and a panicking job doesn't stall the rest.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trivia_model::Priority;
use trivia_queue::{PriorityQueue, WorkerPool};

#[tokio::test]
async fn pool_drains_queue_in_priority_order_despite_a_panicking_job() {
    let queue = Arc::new(PriorityQueue::<u32>::default());
    queue.enqueue(Priority::Low, 1);
    queue.enqueue(Priority::Critical, 2);
    queue.enqueue(Priority::Normal, 3);

    let pool = WorkerPool::new(1);
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    for _ in 0..3 {
        let queue = Arc::clone(&queue);
        let order = Arc::clone(&order);
        pool.submit(Box::pin(async move {
            let Some((_, item)) = queue.dequeue() else {
                return;
            };
            if item == 3 {
                panic!("simulated fan-out failure for item 3");
            }
            order.lock().unwrap().push(item);
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    assert_eq!(pool.panicked(), 1);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn rejected_submissions_are_countable_for_backpressure_metrics() {
    let pool = WorkerPool::new(1);
    let counter = Arc::new(AtomicUsize::new(0));

    let mut accepted = 0;
    for _ in 0..200 {
        let counter = Arc::clone(&counter);
        if pool.submit(Box::pin(async move {
            counter.fetch_add(1, Ordering::Relaxed);
        })) {
            accepted += 1;
        }
    }

    assert!(pool.submitted() as usize <= accepted);
    assert_eq!(pool.submitted(), accepted as u64);
}
