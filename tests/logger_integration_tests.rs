
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blazelog::io::IoRing;
use blazelog::queue::{BoundedQueue, ThreadSafeQueue};
use blazelog::{Config, Logger};
use test_log::test;
use test_utilities::{create_test_dir, read_all_log_lines, read_lines, unique_log_path};

fn config_for(path: &std::path::Path) -> Config {
    Config {
        log_file_name: path.to_string_lossy().into_owned(),
        // Keep scenarios on a single file unless rotation is the point.
        max_log_size_bytes: Some(1 << 40),
        ..Config::default()
    }
}

#[test]
fn three_records_single_thread_in_order() {
    if !IoRing::is_available() {
        return;
    }
    let dir = create_test_dir("three_records");
    let path = unique_log_path(dir.path(), "three");

    let logger = Logger::new(config_for(&path)).unwrap();
    logger.info("Message 1");
    logger.info("Message 2");
    logger.info("Message 3");
    logger.shutdown();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 3);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.contains("[INFO]"), "missing level in: {line}");
        assert!(
            line.contains(&format!("Message {}", i + 1)),
            "out of order: {line}"
        );
    }
}

#[test]
fn two_producers_keep_their_own_order() {
    if !IoRing::is_available() {
        return;
    }
    let dir = create_test_dir("two_producers");
    let path = unique_log_path(dir.path(), "producers");

    let logger = Arc::new(Logger::new(config_for(&path)).unwrap());
    let handles: Vec<_> = (0..2)
        .map(|p| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..5 {
                    logger.info(format!("producer {p} message {i}"));
                    thread::sleep(Duration::from_millis(2));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    Arc::try_unwrap(logger).ok().unwrap().shutdown();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 10);

    for p in 0..2 {
        for i in 0..5 {
            let needle = format!("producer {p} message {i}");
            assert_eq!(
                lines.iter().filter(|l| l.contains(&needle)).count(),
                1,
                "expected exactly one occurrence of {needle}"
            );
        }
        // Per-producer order is preserved in the file.
        let indices: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains(&format!("producer {p} ")))
            .map(|(n, _)| n)
            .collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted);
    }
}

#[test]
fn flush_makes_all_prior_records_durable() {
    if !IoRing::is_available() {
        return;
    }
    let dir = create_test_dir("flush_hundred");
    let path = unique_log_path(dir.path(), "flush");

    let logger = Logger::new(config_for(&path)).unwrap();
    for i in 0..100 {
        logger.info(format!("Message {i}"));
    }
    logger.flush();

    // The file is complete before the logger is dropped.
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 100);
    for (n, line) in lines.iter().enumerate() {
        assert!(
            line.contains(&format!("Message {n}")),
            "line {n} out of order: {line}"
        );
    }

    logger.shutdown();
}

#[test]
fn early_shutdown_under_load_loses_nothing() {
    if !IoRing::is_available() {
        return;
    }
    let dir = create_test_dir("shutdown_load");
    let path = unique_log_path(dir.path(), "load");

    let producers = 4;
    let per_producer = 100_000;

    let logger = Arc::new(Logger::new(config_for(&path)).unwrap());
    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..per_producer {
                    logger.info(format!("p{p} n{i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every push above was observed as successful, so the destructor must
    // get all of them onto disk.
    Arc::try_unwrap(logger).ok().unwrap().shutdown();

    let lines = read_all_log_lines(&path);
    assert_eq!(lines.len(), producers * per_producer);
}

#[test]
fn rotation_starts_a_fresh_file() {
    if !IoRing::is_available() {
        return;
    }
    let dir = create_test_dir("rotation");
    let path = dir.path().join("rotated.log");

    let config = Config {
        log_file_name: path.to_string_lossy().into_owned(),
        max_log_size_bytes: Some(4096),
        ..Config::default()
    };

    let logger = Logger::new(config).unwrap();
    let payload = "z".repeat(100);
    for i in 0..100 {
        logger.info(format!("entry {i} {payload}"));
    }
    logger.shutdown();

    let first_rotated = dir.path().join("rotated1.log");
    assert!(first_rotated.exists(), "first rotation did not happen");

    // The active file was reopened fresh after the last rotation, so it
    // holds only what came after it.
    let active_len = std::fs::metadata(&path).unwrap().len();
    assert!(active_len < 100 * 160, "active file was never rotated");

    // Nothing was lost across the rotations.
    let lines = read_all_log_lines(&path);
    assert_eq!(lines.len(), 100);
    for (n, line) in lines.iter().enumerate() {
        assert!(line.contains(&format!("entry {n} ")), "out of order: {line}");
    }
}

#[test]
fn bounded_queue_applies_backpressure_without_loss() {
    if !IoRing::is_available() {
        return;
    }
    let dir = create_test_dir("bounded");
    let path = unique_log_path(dir.path(), "bounded");

    let queue: Arc<dyn ThreadSafeQueue> = Arc::new(BoundedQueue::new(64));
    let config = Config {
        log_file_name: path.to_string_lossy().into_owned(),
        max_log_size_bytes: Some(1 << 40),
        queue: Some(queue),
        ..Config::default()
    };

    let logger = Logger::new(config).unwrap();
    for i in 0..10_000 {
        logger.info(format!("pressured {i}"));
    }
    logger.shutdown();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 10_000);
}

#[test]
fn global_sink_initializes_once() {
    if !IoRing::is_available() {
        return;
    }
    assert!(matches!(
        blazelog::get(),
        Err(blazelog::BlazeLogError::NotInitialized)
    ));

    let dir = create_test_dir("global");
    let path = unique_log_path(dir.path(), "global");
    // The directory must outlive the process-wide sink.
    let _keep = dir.keep();

    let first = blazelog::init(config_for(&path)).unwrap();
    let second = blazelog::init(Config::default()).unwrap();
    assert!(std::ptr::eq(first, second));

    let handle = blazelog::get().unwrap();
    handle.info("via the global sink");
    handle.flush();

    assert_eq!(read_lines(&path).len(), 1);
}
