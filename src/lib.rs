//! blazelog is an asynchronous, single-file structured log sink for Linux.
//!
//! Producer threads enqueue records without blocking; a single background
//! worker drains the queue, formats and coalesces records into pooled write
//! buffers, submits them through io_uring and rotates the log file when it
//! crosses a size threshold.
//!
//! ```no_run
//! let logger = blazelog::init(blazelog::Config::default()).unwrap();
//! logger.info("service started");
//! logger.flush();
//! ```

use std::sync::OnceLock;

use parking_lot::Mutex;

pub mod config;
pub mod error;
pub mod io;
pub mod memory;
pub mod queue;
pub mod record;
pub mod telemetry;

mod logger;

pub use config::{Config, ErrorHandler};
pub use error::{BlazeLogError, ErrorSource};
pub use logger::Logger;
pub use record::{Record, Severity};

// =============================================================================
// GLOBAL SINK
// =============================================================================

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Install the process-wide sink. Idempotent: the first successful call
/// wins and later calls return the already-installed logger untouched.
pub fn init(config: Config) -> Result<&'static Logger, BlazeLogError> {
    let _guard = INIT_LOCK.lock();
    if let Some(logger) = GLOBAL_LOGGER.get() {
        return Ok(logger);
    }
    let logger = Logger::new(config)?;
    Ok(GLOBAL_LOGGER.get_or_init(|| logger))
}

/// Handle to the process-wide sink. Obtain it once per caller; it is an
/// error to call this before [`init`].
pub fn get() -> Result<&'static Logger, BlazeLogError> {
    GLOBAL_LOGGER.get().ok_or(BlazeLogError::NotInitialized)
}
