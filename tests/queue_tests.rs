use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blazelog::queue::{BoundedQueue, ThreadSafeQueue, UnboundedQueue};
use blazelog::record::{Record, Severity};
use test_log::test;

fn record(payload: &str) -> Record {
    Record::new(Severity::Info, payload.to_string())
}

#[test]
fn unbounded_preserves_fifo_order() {
    let queue = UnboundedQueue::new();
    for i in 0..10 {
        queue.push(record(&format!("message {i}")));
    }
    assert_eq!(queue.len(), 10);

    for i in 0..10 {
        let popped = queue.try_pop().unwrap();
        assert_eq!(popped.payload, format!("message {i}"));
    }
    assert!(queue.is_empty());
}

#[test]
fn unbounded_try_pop_on_empty_returns_none() {
    let queue = UnboundedQueue::new();
    assert!(queue.try_pop().is_none());
}

#[test]
fn unbounded_pop_blocks_until_push() {
    let queue = Arc::new(UnboundedQueue::new());
    let consumer_queue = Arc::clone(&queue);

    let consumer = thread::spawn(move || consumer_queue.pop());

    thread::sleep(Duration::from_millis(50));
    queue.push(record("delivered"));

    let popped = consumer.join().unwrap();
    assert_eq!(popped.unwrap().payload, "delivered");
}

#[test]
fn shutdown_unblocks_pop_and_drains_remaining() {
    let queue = Arc::new(UnboundedQueue::new());
    queue.push(record("queued before shutdown"));
    queue.shutdown();

    // Already-queued records are still handed out.
    assert_eq!(
        queue.pop().unwrap().payload,
        "queued before shutdown"
    );
    // Then pop reports exhaustion instead of blocking.
    assert!(queue.pop().is_none());
}

#[test]
fn push_after_shutdown_is_a_no_op() {
    let queue = UnboundedQueue::new();
    queue.shutdown();
    queue.shutdown(); // idempotent

    queue.push(record("ignored"));
    assert!(queue.is_empty());
}

#[test]
fn bounded_preserves_fifo_across_wraparound() {
    let queue = BoundedQueue::new(4);

    for round in 0..3 {
        for i in 0..4 {
            queue.push(record(&format!("round {round} message {i}")));
        }
        for i in 0..4 {
            let popped = queue.try_pop().unwrap();
            assert_eq!(popped.payload, format!("round {round} message {i}"));
        }
    }
    assert!(queue.is_empty());
}

#[test]
fn bounded_push_blocks_while_full() {
    let queue = Arc::new(BoundedQueue::new(2));
    queue.push(record("first"));
    queue.push(record("second"));
    assert_eq!(queue.len(), 2);

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        producer_queue.push(record("third"));
    });

    thread::sleep(Duration::from_millis(50));
    // The producer is still blocked on the full ring.
    assert_eq!(queue.len(), 2);

    assert_eq!(queue.pop().unwrap().payload, "first");
    producer.join().unwrap();
    assert_eq!(queue.len(), 2);

    assert_eq!(queue.pop().unwrap().payload, "second");
    assert_eq!(queue.pop().unwrap().payload, "third");
}

#[test]
fn bounded_shutdown_releases_blocked_producer() {
    let queue = Arc::new(BoundedQueue::new(1));
    queue.push(record("occupies the only slot"));

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        // Blocks on the full ring until shutdown, then gives up.
        producer_queue.push(record("never admitted"));
    });

    thread::sleep(Duration::from_millis(50));
    queue.shutdown();
    producer.join().unwrap();

    assert_eq!(queue.len(), 1);
}

#[test]
fn concurrent_producers_lose_nothing() {
    let queue = Arc::new(UnboundedQueue::new());
    let producers = 4;
    let per_producer = 1000;

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..per_producer {
                    queue.push(record(&format!("producer {p} message {i}")));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(queue.len(), producers * per_producer);

    // Per-producer FIFO: message indices from one producer arrive in order.
    let mut next_index = vec![0usize; producers];
    while let Some(popped) = queue.try_pop() {
        let words: Vec<&str> = popped.payload.split_whitespace().collect();
        let producer: usize = words[1].parse().unwrap();
        let index: usize = words[3].parse().unwrap();
        assert_eq!(index, next_index[producer]);
        next_index[producer] += 1;
    }
    assert!(next_index.iter().all(|&n| n == per_producer));
}
