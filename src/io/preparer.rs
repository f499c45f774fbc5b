use std::io::Cursor;
use std::sync::Arc;

use chrono::SecondsFormat;

use crate::config::ErrorHandler;
use crate::memory::{Buffer, BufferPool};
use crate::record::Record;

/// Staging area for coalescing, in bytes.
pub const STAGING_BUFFER_SIZE: usize = 16 * 1024;

/// Headroom added to the payload length when sizing an individual write,
/// covering the bracketed prefix.
const INDIVIDUAL_HEADROOM: usize = 256;

/// A buffer ready for submission and the number of log records it carries.
pub struct PreparedBuffer {
    pub buffer: Buffer,
    pub records: usize,
}

/// Result of preparing one record.
///
/// Up to two buffers can come out of a single call: a flushed staging
/// buffer and an individually formatted record (when the record did not fit
/// in the staging area). No buffers at all means the record was purely
/// staged. `dropped` counts records lost to a formatting failure, which has
/// already been reported through the error handler.
pub struct PreparedWrite {
    pub buffers: [Option<PreparedBuffer>; 2],
    pub should_submit: bool,
    pub dropped: usize,
}

impl PreparedWrite {
    fn staged() -> Self {
        PreparedWrite {
            buffers: [None, None],
            should_submit: false,
            dropped: 0,
        }
    }
}

/// Formats records and coalesces them into write buffers.
///
/// Does not touch the ring: the event loop owns submission. With
/// coalescing enabled, records are formatted directly into the staging
/// area, which is flushed into a pooled buffer once `coalesce_size`
/// messages are staged or occupancy passes 90%.
pub struct WritePreparer {
    coalesce_size: u16,
    pool: Arc<BufferPool>,
    error_handler: ErrorHandler,
    staging: Buffer,
    messages_in_staging: usize,
}

impl WritePreparer {
    pub fn new(coalesce_size: u16, pool: Arc<BufferPool>, error_handler: ErrorHandler) -> Self {
        WritePreparer {
            coalesce_size,
            pool,
            error_handler,
            staging: Buffer::with_capacity(STAGING_BUFFER_SIZE),
            messages_in_staging: 0,
        }
    }

    pub fn prepare(&mut self, record: Record) -> PreparedWrite {
        if self.coalesce_size > 1 {
            self.prepare_coalesced(record)
        } else {
            let buffer = self.format_individual(&record);
            let dropped = usize::from(buffer.is_none());
            PreparedWrite {
                buffers: [buffer, None],
                should_submit: false,
                dropped,
            }
        }
    }

    fn prepare_coalesced(&mut self, record: Record) -> PreparedWrite {
        if format_into(&mut self.staging, &record).is_ok() {
            self.messages_in_staging += 1;

            let reached_coalesce_count = self.messages_in_staging >= self.coalesce_size as usize;
            let nearly_full = self.staging.len() > STAGING_BUFFER_SIZE * 9 / 10;
            if reached_coalesce_count || nearly_full {
                if let Some(flushed) = self.flush_staged() {
                    return PreparedWrite {
                        buffers: [Some(flushed), None],
                        should_submit: true,
                        dropped: 0,
                    };
                }
            }

            return PreparedWrite::staged();
        }

        // The record does not fit in the remaining staging area: flush what
        // is staged, then format this record on the individual path.
        let flushed = self.flush_staged();
        let should_submit = flushed.is_some();
        let individual = self.format_individual(&record);
        let dropped = usize::from(individual.is_none());
        PreparedWrite {
            buffers: [flushed, individual],
            should_submit,
            dropped,
        }
    }

    fn format_individual(&mut self, record: &Record) -> Option<PreparedBuffer> {
        let estimated_size = record.payload.len() + INDIVIDUAL_HEADROOM;
        let mut buffer = self.pool.acquire(estimated_size);

        match format_into(&mut buffer, record) {
            Ok(()) => Some(PreparedBuffer { buffer, records: 1 }),
            Err(e) => {
                self.pool.release(buffer);
                (self.error_handler)(&format!("WritePreparer: failed to format record: {e}"));
                None
            }
        }
    }

    /// Force emission of whatever is staged. Returns `None` when nothing is.
    pub fn flush_staged(&mut self) -> Option<PreparedBuffer> {
        if self.staging.is_empty() {
            return None;
        }

        let mut persistent = self.pool.acquire(self.staging.len());
        persistent.copy_from(self.staging.filled());

        let records = self.messages_in_staging;
        self.staging.clear();
        self.messages_in_staging = 0;

        Some(PreparedBuffer {
            buffer: persistent,
            records,
        })
    }

    pub fn has_staged(&self) -> bool {
        !self.staging.is_empty()
    }

    /// Throw away staged records (ring-failure teardown). Returns how many
    /// were lost.
    pub fn discard_staged(&mut self) -> usize {
        let discarded = self.messages_in_staging;
        self.staging.clear();
        self.messages_in_staging = 0;
        discarded
    }
}

/// Format one record into the spare region of `buffer`, advancing its
/// in-use count on success. On overflow the buffer is left untouched.
fn format_into(buffer: &mut Buffer, record: &Record) -> std::io::Result<()> {
    let mut cursor = Cursor::new(buffer.spare_mut());
    write_record(&mut cursor, record)?;
    let written = cursor.position() as usize;
    buffer.advance(written);
    Ok(())
}

#[cfg(not(feature = "sequence-tracking"))]
fn write_record(dst: &mut impl std::io::Write, record: &Record) -> std::io::Result<()> {
    writeln!(
        dst,
        "[{}] [{}] [Thread: {}]: {}",
        record.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        record.level.as_str(),
        record.thread_id,
        record.payload
    )
}

#[cfg(feature = "sequence-tracking")]
fn write_record(dst: &mut impl std::io::Write, record: &Record) -> std::io::Result<()> {
    writeln!(
        dst,
        "[{}] [{}] [Thread: {}] [Seq: {}]: {}",
        record.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        record.level.as_str(),
        record.thread_id,
        record.sequence,
        record.payload
    )
}
