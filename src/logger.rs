use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::config::{Config, ErrorHandler, ResolvedConfig};
use crate::error::{BlazeLogError, ErrorSource};
use crate::io::{
    FileRotator, InFlightTable, IoRing, PreparedWrite, WriteOnlyFile, WriteOp, WritePreparer,
};
use crate::memory::{Buffer, BufferPool, PoolSizing};
use crate::queue::ThreadSafeQueue;
use crate::record::{Record, Severity};

/// How long the worker blocks on the ring when the queue is empty but
/// writes are outstanding.
const COMPLETION_WAIT: Duration = Duration::from_micros(100);

/// Idle nap when there is nothing to drain and nothing in flight.
const IDLE_SLEEP: Duration = Duration::from_micros(10);

/// Re-check period for `flush` waiters.
const FLUSH_RECHECK: Duration = Duration::from_millis(10);

/// Bound on crediting straggler completions before the fatal-ring drain
/// writes the rest off.
const TEARDOWN_REAP_BUDGET: Duration = Duration::from_millis(100);

/// State shared between the producer facade and the worker thread.
struct SharedState {
    queue: Arc<dyn ThreadSafeQueue>,
    /// Records popped from the queue whose bytes are not yet on disk.
    outstanding: AtomicUsize,
    stop_requested: AtomicBool,
    worker_exited: AtomicBool,
    sync: Mutex<()>,
    cond: Condvar,
    error_handler: ErrorHandler,
}

impl SharedState {
    fn notify_waiters(&self) {
        let _guard = self.sync.lock();
        self.cond.notify_all();
    }
}

/// Asynchronous single-file log sink.
///
/// Producer threads call [`info`](Logger::info)/[`warn`](Logger::warn)/
/// [`error`](Logger::error), which only enqueue a record; one background
/// worker formats, coalesces and submits everything through io_uring and
/// rotates the file at the configured size threshold.
///
/// Dropping the logger drains the queue, waits for outstanding writes and
/// joins the worker with a bounded timeout.
pub struct Logger {
    shared: Arc<SharedState>,
    worker: Option<thread::JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl Logger {
    pub fn new(config: Config) -> Result<Self, BlazeLogError> {
        let resolved = config.resolve()?;

        let shared = Arc::new(SharedState {
            queue: Arc::clone(&resolved.queue),
            outstanding: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(false),
            worker_exited: AtomicBool::new(false),
            sync: Mutex::new(()),
            cond: Condvar::new(),
            error_handler: Arc::clone(&resolved.error_handler),
        });

        // Open the file and ring on the caller's thread so setup failures
        // surface as errors instead of a dead worker.
        let worker = Worker::new(Arc::clone(&shared), &resolved)?;
        let shutdown_timeout = resolved.shutdown_timeout;

        let handle = thread::Builder::new()
            .name("blazelog-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| BlazeLogError::WorkerSpawnFailed {
                source: Box::new(ErrorSource::Io(e.to_string())),
            })?;

        Ok(Logger {
            shared,
            worker: Some(handle),
            shutdown_timeout,
        })
    }

    pub fn info(&self, message: impl Into<String>) {
        self.write(Severity::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.write(Severity::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.write(Severity::Error, message.into());
    }

    fn write(&self, level: Severity, payload: String) {
        self.shared.queue.push(Record::new(level, payload));
    }

    /// Block until every record enqueued before this call is on disk.
    ///
    /// Safe to call concurrently from multiple threads while other
    /// producers continue to log.
    pub fn flush(&self) {
        let mut guard = self.shared.sync.lock();
        while !(self.shared.queue.is_empty()
            && self.shared.outstanding.load(Ordering::Acquire) == 0)
        {
            if self.shared.worker_exited.load(Ordering::Acquire) {
                return;
            }
            self.shared
                .cond
                .wait_for(&mut guard, FLUSH_RECHECK);
        }
    }

    /// Drain, stop and join the worker. Equivalent to dropping the logger.
    pub fn shutdown(self) {
        drop(self);
    }

    fn request_shutdown(&mut self) {
        self.shared.queue.shutdown();
        self.shared.stop_requested.store(true, Ordering::Release);

        let deadline = Instant::now() + self.shutdown_timeout;
        {
            let mut guard = self.shared.sync.lock();
            while !self.shared.worker_exited.load(Ordering::Acquire) {
                if self
                    .shared
                    .cond
                    .wait_until(&mut guard, deadline)
                    .timed_out()
                {
                    break;
                }
            }
        }

        if self.shared.worker_exited.load(Ordering::Acquire) {
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        } else {
            (self.shared.error_handler)(
                &BlazeLogError::ShutdownTimeout {
                    seconds: self.shutdown_timeout.as_secs(),
                }
                .to_string(),
            );
            // Detach: the worker may leak, the process must not hang.
            self.worker.take();
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.request_shutdown();
        }
    }
}

/// The background event loop. Owns the ring, the file, the rotator, the
/// preparer and the buffer pool; nothing else touches them.
struct Worker {
    shared: Arc<SharedState>,
    ring: IoRing,
    file: WriteOnlyFile,
    rotator: FileRotator,
    preparer: WritePreparer,
    pool: Arc<BufferPool>,
    in_flight: InFlightTable,
    /// Staged submissions not yet handed to the kernel.
    pending_writes: usize,
    /// Records written off on fatal-ring paths, awaiting the one drop
    /// report that `drain_without_processing` emits.
    lost_records: usize,
    completion_scratch: Vec<(u64, i32)>,
    batch_size: usize,
    queue_depth: usize,
    max_logs_per_iteration: usize,
}

impl Worker {
    fn new(shared: Arc<SharedState>, resolved: &ResolvedConfig) -> Result<Self, BlazeLogError> {
        let file = WriteOnlyFile::open(&resolved.log_file_name)?;
        let ring = IoRing::new(resolved.queue_depth as u32)?;
        let pool = Arc::new(BufferPool::new(PoolSizing {
            small_buffer_size: resolved.small_buffer_size as usize,
            medium_buffer_size: resolved.medium_buffer_size as usize,
            large_buffer_size: resolved.large_buffer_size as usize,
            small_pool_size: resolved.small_buffer_pool_size as usize,
            medium_pool_size: resolved.medium_buffer_pool_size as usize,
            large_pool_size: resolved.large_buffer_pool_size as usize,
        }));
        let rotator = FileRotator::new(&resolved.log_file_name, resolved.max_log_size_bytes);
        let preparer = WritePreparer::new(
            resolved.coalesce_size,
            Arc::clone(&pool),
            Arc::clone(&resolved.error_handler),
        );

        Ok(Worker {
            shared,
            ring,
            file,
            rotator,
            preparer,
            pool,
            in_flight: InFlightTable::new(),
            pending_writes: 0,
            lost_records: 0,
            completion_scratch: Vec::new(),
            batch_size: resolved.batch_size as usize,
            queue_depth: resolved.queue_depth as usize,
            max_logs_per_iteration: resolved.max_logs_per_iteration as usize,
        })
    }

    fn run(mut self) {
        debug!("blazelog worker started");

        // Runs while not stop-requested OR the queue is non-empty OR
        // writes are outstanding.
        loop {
            if !self.ring.is_operational() {
                self.drain_without_processing();
                break;
            }

            self.iterate();

            let queue_empty = self.shared.queue.is_empty();
            let outstanding = self.shared.outstanding.load(Ordering::Acquire);

            if queue_empty && outstanding == 0 {
                self.shared.notify_waiters();
                if self.shared.stop_requested.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(IDLE_SLEEP);
            } else if queue_empty {
                self.ring.wait_for_completion(COMPLETION_WAIT);
            }
        }

        self.finish();
    }

    /// One pass of the event loop: drain a bounded number of records,
    /// flush stragglers out of the preparer, submit, reap, maybe rotate.
    fn iterate(&mut self) {
        let mut processed = 0;
        while processed < self.max_logs_per_iteration {
            // Count the record as outstanding before taking it, so a flush
            // waiter can never observe an empty queue and a zero counter
            // while a record is between the two.
            self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
            let Some(record) = self.shared.queue.try_pop() else {
                self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
                break;
            };

            let PreparedWrite {
                buffers,
                should_submit,
                dropped,
            } = self.preparer.prepare(record);

            if dropped > 0 {
                self.retire_records(dropped);
            }
            let mut ring_failed = false;
            for prepared in buffers.into_iter().flatten() {
                if ring_failed {
                    // A buffer behind a failed one still carries records;
                    // write it off rather than dropping it unaccounted.
                    self.abandon_write(prepared.buffer, prepared.records);
                } else if !self.stage_write(prepared.buffer, prepared.records) {
                    ring_failed = true;
                }
            }
            if ring_failed {
                return;
            }
            if (should_submit || self.pending_writes >= self.batch_size)
                && !self.submit_pending()
            {
                return;
            }

            processed += 1;
        }

        if let Some(flushed) = self.preparer.flush_staged() {
            if !self.stage_write(flushed.buffer, flushed.records) {
                return;
            }
        }

        if self.pending_writes > 0 && !self.submit_pending() {
            return;
        }

        self.reap_completions();
        self.maybe_rotate();
    }

    /// Register a continuation for `buffer` and stage its write on the
    /// ring, submitting early when the submission queue is full.
    fn stage_write(&mut self, buffer: Buffer, records: usize) -> bool {
        // Bound outstanding submissions to the ring depth.
        while self.in_flight.len() >= self.queue_depth {
            if !self.submit_pending() {
                self.abandon_write(buffer, records);
                return false;
            }
            self.ring.wait_for_completion(COMPLETION_WAIT);
            self.reap_completions();
        }

        let data = buffer.as_ptr();
        let len = buffer.len() as u32;
        let token = self.in_flight.insert(WriteOp::new(buffer, records));
        let fd = self.file.fd();

        loop {
            if self.ring.prepare_write(fd, data, len, token) {
                self.pending_writes += 1;
                return true;
            }
            if !self.ring.is_operational() {
                // The current token is still tracked; the sweep counts it
                // along with everything else mid-batch.
                self.abandon_in_flight();
                return false;
            }
            // Submission queue full: push the staged entries to the kernel
            // and retry. A failed submit has already swept the table.
            if !self.submit_pending() {
                return false;
            }
        }
    }

    fn abandon_write(&mut self, buffer: Buffer, records: usize) {
        self.pool.release(buffer);
        self.retire_records(records);
        self.lost_records += records;
    }

    /// Fatal-path sweep: credit whatever already completed, then write off
    /// every write still tracked so it shows up in the drop report. Their
    /// buffers may be under active kernel DMA and are leaked, not pooled.
    fn abandon_in_flight(&mut self) {
        self.reap_completions();

        let mut lost = 0;
        for op in self.in_flight.drain() {
            lost += op.record_count();
            std::mem::forget(op.into_buffer());
        }
        self.pending_writes = 0;

        if lost > 0 {
            self.retire_records(lost);
            self.lost_records += lost;
        }
    }

    fn submit_pending(&mut self) -> bool {
        if self.pending_writes == 0 {
            return true;
        }
        if self.ring.submit() {
            self.pending_writes = 0;
            true
        } else {
            // Everything staged into this batch is lost with the ring;
            // account for it now so the drop report is complete.
            self.abandon_in_flight();
            false
        }
    }

    fn reap_completions(&mut self) {
        let mut scratch = std::mem::take(&mut self.completion_scratch);
        scratch.clear();
        self.ring
            .process_completions(|token, result| scratch.push((token, result)));
        for (token, result) in scratch.drain(..) {
            self.complete_write(token, result);
        }
        self.completion_scratch = scratch;
    }

    /// Resume the continuation for one completed write.
    fn complete_write(&mut self, token: u64, result: i32) {
        let Some(op) = self.in_flight.take(token) else {
            debug!("completion for unknown token {token}");
            return;
        };

        if result >= 0 {
            self.rotator.update_current_size(result as u64);
            if (result as usize) < op.submitted_len() {
                (self.shared.error_handler)(&format!(
                    "short write: {} of {} bytes",
                    result,
                    op.submitted_len()
                ));
            }
        } else {
            (self.shared.error_handler)(&format!("log write failed with errno {}", -result));
        }

        let records = op.record_count();
        self.pool.release(op.into_buffer());
        self.retire_records(records);
    }

    fn retire_records(&self, records: usize) {
        let previous = self.shared.outstanding.fetch_sub(records, Ordering::AcqRel);
        if previous == records {
            self.shared.notify_waiters();
        }
    }

    /// Rotation only runs between iterations with nothing in flight, since
    /// outstanding submissions reference the pre-rotation descriptor.
    fn maybe_rotate(&mut self) {
        if !self.rotator.should_rotate() || !self.in_flight.is_empty() {
            return;
        }

        match self.rotator.rotate() {
            Ok(_) => {
                if let Err(e) = self.file.reopen() {
                    // Keep appending through the old descriptor, which now
                    // points at the rotated file.
                    (self.shared.error_handler)(&format!(
                        "failed to reopen log file after rotation: {e}"
                    ));
                }
            }
            Err(e) => (self.shared.error_handler)(&e.to_string()),
        }
    }

    /// Fatal-ring path: drains every record that will never reach the file
    /// (still queued, parked in the staging area, or stranded mid-batch in
    /// the in-flight table) and reports the loss as a single count.
    fn drain_without_processing(&mut self) {
        // Writes submitted before the failure may still complete; give
        // them a bounded chance to be credited before the sweep.
        let deadline = Instant::now() + TEARDOWN_REAP_BUDGET;
        while !self.in_flight.is_empty() && Instant::now() < deadline {
            self.ring.wait_for_completion(COMPLETION_WAIT);
            self.reap_completions();
        }
        self.abandon_in_flight();

        // Records parked in the staging area were counted as outstanding
        // when they were popped; retire them as they are written off.
        let discarded_staged = self.preparer.discard_staged();
        if discarded_staged > 0 {
            self.retire_records(discarded_staged);
        }

        let mut dropped = self.lost_records + discarded_staged;
        self.lost_records = 0;
        while self.shared.queue.try_pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            (self.shared.error_handler)(&format!(
                "io_uring failure: dropped {dropped} queued log records"
            ));
        }
    }

    fn finish(&mut self) {
        // Both exit paths leave the in-flight table empty and the
        // outstanding counter retired; only the waiters are left to wake.
        self.shared.worker_exited.store(true, Ordering::Release);
        self.shared.notify_waiters();
        debug!("blazelog worker exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn capturing_handler() -> (ErrorHandler, Arc<StdMutex<Vec<String>>>) {
        let reported = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let handler: ErrorHandler = Arc::new(move |msg: &str| {
            sink.lock().unwrap().push(msg.to_string());
        });
        (handler, reported)
    }

    #[test]
    fn failed_ring_drains_queue_and_reports_drop_count() {
        if !IoRing::is_available() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("failed.log");
        let (handler, reported) = capturing_handler();

        let config = Config {
            log_file_name: log_path.to_string_lossy().into_owned(),
            internal_error_handler: Some(handler),
            ..Config::default()
        };
        let resolved = config.resolve().unwrap();

        let shared = Arc::new(SharedState {
            queue: Arc::clone(&resolved.queue),
            outstanding: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(true),
            worker_exited: AtomicBool::new(false),
            sync: Mutex::new(()),
            cond: Condvar::new(),
            error_handler: Arc::clone(&resolved.error_handler),
        });

        for i in 0..5 {
            shared.queue.push(Record::new(Severity::Info, format!("doomed {i}")));
        }

        let worker = Worker::new(Arc::clone(&shared), &resolved).unwrap();
        worker.ring.mark_failed();
        worker.run();

        assert!(shared.worker_exited.load(Ordering::Acquire));
        assert_eq!(shared.outstanding.load(Ordering::Acquire), 0);
        assert!(shared.queue.is_empty());

        let messages = reported.lock().unwrap();
        assert!(
            messages.iter().any(|m| m.contains("dropped 5")),
            "drop count not reported: {messages:?}"
        );
    }

    #[test]
    fn mid_batch_submit_failure_counts_staged_writes() {
        if !IoRing::is_available() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let (handler, reported) = capturing_handler();
        let config = Config {
            log_file_name: dir
                .path()
                .join("midbatch.log")
                .to_string_lossy()
                .into_owned(),
            batch_size: 8,
            internal_error_handler: Some(handler),
            ..Config::default()
        };
        let resolved = config.resolve().unwrap();

        let shared = Arc::new(SharedState {
            queue: Arc::clone(&resolved.queue),
            outstanding: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(true),
            worker_exited: AtomicBool::new(false),
            sync: Mutex::new(()),
            cond: Condvar::new(),
            error_handler: Arc::clone(&resolved.error_handler),
        });

        let mut worker = Worker::new(Arc::clone(&shared), &resolved).unwrap();

        // Stage three writes into one batch; none have been submitted.
        for i in 0..3 {
            shared.outstanding.fetch_add(1, Ordering::AcqRel);
            let mut buffer = worker.pool.acquire(64);
            buffer.copy_from(format!("staged {i}\n").as_bytes());
            assert!(worker.stage_write(buffer, 1));
        }
        assert_eq!(worker.pending_writes, 3);
        assert_eq!(worker.in_flight.len(), 3);

        // The ring dies before the batch reaches the kernel. The failed
        // submit must retire and count every write stranded in the batch.
        worker.ring.mark_failed();
        assert!(!worker.submit_pending());
        assert!(worker.in_flight.is_empty());
        assert_eq!(shared.outstanding.load(Ordering::Acquire), 0);

        // Two more records are still queued when the loop notices.
        shared
            .queue
            .push(Record::new(Severity::Info, "queued a".to_string()));
        shared
            .queue
            .push(Record::new(Severity::Info, "queued b".to_string()));
        worker.run();

        assert!(shared.worker_exited.load(Ordering::Acquire));
        let messages = reported.lock().unwrap();
        assert!(
            messages.iter().any(|m| m.contains("dropped 5")),
            "mid-batch records missing from the drop report: {messages:?}"
        );
    }

    #[test]
    fn flush_then_shutdown_completes_cleanly() {
        if !IoRing::is_available() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            log_file_name: dir
                .path()
                .join("exited.log")
                .to_string_lossy()
                .into_owned(),
            ..Config::default()
        };

        let logger = Logger::new(config).unwrap();
        logger.info("one line before shutdown");
        logger.flush();
        logger.shutdown();
    }
}
