use std::sync::Arc;
use std::time::Duration;

use crate::error::BlazeLogError;
use crate::queue::{ThreadSafeQueue, UnboundedQueue};

/// Handler for all blazelog internal errors and configuration warnings.
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Writes diagnostics to stderr when no handler is supplied.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|msg| eprintln!("[blazelog ERROR] {msg}"))
}

pub const DEFAULT_LOG_FILE_NAME: &str = "output.log";
pub const DEFAULT_MAX_LOG_SIZE_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_BATCH_SIZE: u16 = 32;
pub const DEFAULT_QUEUE_DEPTH: u16 = 512;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u16 = 3;

pub const DEFAULT_SMALL_BUFFER_SIZE: u16 = 1024;
pub const DEFAULT_MEDIUM_BUFFER_SIZE: u16 = 4096;
pub const DEFAULT_LARGE_BUFFER_SIZE: u16 = 16384;
pub const DEFAULT_SMALL_POOL_SIZE: u16 = 128;
pub const DEFAULT_MEDIUM_POOL_SIZE: u16 = 64;
pub const DEFAULT_LARGE_POOL_SIZE: u16 = 32;

/// User-facing configuration. Every field is optional: zero or empty means
/// "unset, inherit the default". The two exceptions follow the documented
/// field semantics: `max_log_size_bytes = Some(0)` rotates on every write
/// and `coalesce_size = Some(0)` disables coalescing.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Path of the active log file. All severities end up here.
    pub log_file_name: String,

    /// Rotation threshold. A new log file is used when this size is reached.
    /// `Some(0)` rotates on every write.
    pub max_log_size_bytes: Option<u64>,

    /// Number of log messages to batch before calling submit on the ring.
    /// This is the primary tuning parameter; other batching parameters are
    /// auto-calculated from it:
    ///   - queue_depth = 16 x batch_size (good I/O pipeline depth)
    ///   - coalesce_size = batch_size (matches batching for message packing)
    ///
    /// Typical values: 16-64 (balanced), 32 (default), 128+ (high
    /// throughput). Must be <= queue_depth.
    pub batch_size: u16,

    /// io_uring queue depth: maximum number of simultaneous I/O operations.
    /// Auto-calculated as 16 x batch_size if not specified.
    /// Must be >= batch_size.
    pub queue_depth: u16,

    /// Number of log messages to coalesce into a single buffer/write
    /// operation. Auto-calculated as batch_size if not specified.
    ///
    /// Higher values mean fewer write operations and better throughput;
    /// lower values mean lower latency per message. `Some(0)` disables
    /// coalescing (each message is formatted and written individually).
    pub coalesce_size: Option<u16>,

    pub small_buffer_pool_size: u16,
    pub medium_buffer_pool_size: u16,
    pub large_buffer_pool_size: u16,
    pub small_buffer_size: u16,
    pub medium_buffer_size: u16,
    pub large_buffer_size: u16,

    /// Timeout in seconds for worker thread shutdown during logger
    /// destruction. If the worker does not finish within this time the
    /// destructor proceeds anyway to prevent hanging.
    pub shutdown_timeout_seconds: u16,

    /// Custom hand-off queue implementation. Defaults to the unbounded
    /// mutex/condvar queue.
    #[serde(skip)]
    pub queue: Option<Arc<dyn ThreadSafeQueue>>,

    /// Receives diagnostic strings for all blazelog internal errors
    /// (hopefully none). Defaults to a stderr writer.
    #[serde(skip)]
    pub internal_error_handler: Option<ErrorHandler>,
}

/// Fully merged configuration with every dependent parameter derived.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub log_file_name: String,
    pub max_log_size_bytes: u64,
    pub batch_size: u16,
    pub queue_depth: u16,
    pub coalesce_size: u16,
    pub max_logs_per_iteration: u16,
    pub small_buffer_pool_size: u16,
    pub medium_buffer_pool_size: u16,
    pub large_buffer_pool_size: u16,
    pub small_buffer_size: u16,
    pub medium_buffer_size: u16,
    pub large_buffer_size: u16,
    pub shutdown_timeout: Duration,
    pub queue: Arc<dyn ThreadSafeQueue>,
    pub error_handler: ErrorHandler,
}

impl Config {
    /// Apply defaults, derive dependent parameters and validate the result.
    ///
    /// Unsafe ratios produce warnings through the error handler; an invalid
    /// combination (`batch_size > queue_depth`) is a hard error.
    pub fn resolve(self) -> Result<ResolvedConfig, BlazeLogError> {
        let error_handler = self
            .internal_error_handler
            .unwrap_or_else(default_error_handler);

        let user_specified_batch = self.batch_size != 0;
        let batch_size = if user_specified_batch {
            self.batch_size
        } else {
            DEFAULT_BATCH_SIZE
        };

        let queue_depth = if self.queue_depth != 0 {
            self.queue_depth
        } else if user_specified_batch {
            ((batch_size as u32) * 16).min(u16::MAX as u32) as u16
        } else {
            DEFAULT_QUEUE_DEPTH
        };

        let coalesce_size = self.coalesce_size.unwrap_or(batch_size);

        if batch_size > queue_depth {
            return Err(BlazeLogError::InvalidConfig {
                message: format!(
                    "batch_size ({batch_size}) exceeds queue_depth ({queue_depth})"
                ),
            });
        }

        if batch_size > queue_depth / 2 {
            error_handler(&format!(
                "config warning: batch_size ({batch_size}) > queue_depth/2 \
                 ({}) leaves little room for in-flight writes",
                queue_depth / 2
            ));
        }

        if (queue_depth as u32) < 8 * batch_size as u32 {
            error_handler(&format!(
                "config warning: queue_depth ({queue_depth}) < 8 x batch_size \
                 ({batch_size}) gives a shallow I/O pipeline"
            ));
        }

        if coalesce_size > 0 {
            let ratio = coalesce_size as f64 / batch_size as f64;
            if !(0.5..=2.0).contains(&ratio) {
                error_handler(&format!(
                    "config warning: coalesce_size ({coalesce_size}) is far from \
                     batch_size ({batch_size}); ratio {ratio:.2} outside [0.5, 2.0]"
                ));
            }
        }

        let max_logs_per_iteration = derive_max_logs_per_iteration(batch_size, queue_depth);
        if (max_logs_per_iteration as u32) < 2 * batch_size as u32 {
            error_handler(&format!(
                "config warning: max_logs_per_iteration ({max_logs_per_iteration}) \
                 < 2 x batch_size ({batch_size}); completion reaping may starve"
            ));
        }

        let log_file_name = if self.log_file_name.is_empty() {
            DEFAULT_LOG_FILE_NAME.to_string()
        } else {
            self.log_file_name
        };

        let shutdown_timeout_seconds = if self.shutdown_timeout_seconds != 0 {
            self.shutdown_timeout_seconds
        } else {
            DEFAULT_SHUTDOWN_TIMEOUT_SECONDS
        };

        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(UnboundedQueue::new()));

        Ok(ResolvedConfig {
            log_file_name,
            max_log_size_bytes: self
                .max_log_size_bytes
                .unwrap_or(DEFAULT_MAX_LOG_SIZE_BYTES),
            batch_size,
            queue_depth,
            coalesce_size,
            max_logs_per_iteration,
            small_buffer_pool_size: defaulted(self.small_buffer_pool_size, DEFAULT_SMALL_POOL_SIZE),
            medium_buffer_pool_size: defaulted(
                self.medium_buffer_pool_size,
                DEFAULT_MEDIUM_POOL_SIZE,
            ),
            large_buffer_pool_size: defaulted(self.large_buffer_pool_size, DEFAULT_LARGE_POOL_SIZE),
            small_buffer_size: defaulted(self.small_buffer_size, DEFAULT_SMALL_BUFFER_SIZE),
            medium_buffer_size: defaulted(self.medium_buffer_size, DEFAULT_MEDIUM_BUFFER_SIZE),
            large_buffer_size: defaulted(self.large_buffer_size, DEFAULT_LARGE_BUFFER_SIZE),
            shutdown_timeout: Duration::from_secs(shutdown_timeout_seconds as u64),
            queue,
            error_handler,
        })
    }
}

fn defaulted(value: u16, default: u16) -> u16 {
    if value != 0 { value } else { default }
}

/// Bound on records drained per event-loop iteration, derived so completion
/// reaping cannot starve: min(D/2, max(2B, B * sqrt(D/B))).
fn derive_max_logs_per_iteration(batch_size: u16, queue_depth: u16) -> u16 {
    let b = batch_size as f64;
    let d = queue_depth as f64;
    let scaled = (b * (d / b).sqrt()) as u32;
    let floor = 2 * batch_size as u32;
    scaled.max(floor).min(queue_depth as u32 / 2).max(1) as u16
}
