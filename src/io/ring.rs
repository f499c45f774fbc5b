use std::os::unix::io::RawFd;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use io_uring::{IoUring, opcode, types};
use log::{debug, warn};

use crate::error::BlazeLogError;

static RING_PROBE_RESULT: OnceLock<bool> = OnceLock::new();

const PROBE_RING_ENTRIES: u32 = 8;
const PROBE_NOP_TOKEN: u64 = u64::MAX;

/// Submit/complete ring of fixed depth over the kernel io_uring interface.
///
/// Single-writer: only the worker thread touches the ring. Submissions
/// carry an opaque `u64` token that comes back unchanged on the matching
/// completion; the ring never owns the memory behind a staged write.
pub struct IoRing {
    ring: IoUring,
    depth: u32,
    operational: AtomicBool,
}

impl IoRing {
    pub fn new(queue_depth: u32) -> Result<Self, BlazeLogError> {
        // Older kernels reject the cooperative scheduling flags; retry
        // with a plain ring before giving up.
        let ring = IoUring::builder()
            .setup_coop_taskrun()
            .setup_single_issuer()
            .build(queue_depth)
            .or_else(|_| IoUring::new(queue_depth))
            .map_err(|e| BlazeLogError::ring_setup_failed(e, "creating submission ring"))?;

        debug!("submission ring ready, depth {queue_depth}");
        Ok(IoRing {
            ring,
            depth: queue_depth,
            operational: AtomicBool::new(true),
        })
    }

    /// Whether this kernel has a usable io_uring. Probed once per process;
    /// tests use this to skip gracefully instead of failing on old kernels.
    pub fn is_available() -> bool {
        *RING_PROBE_RESULT.get_or_init(|| match Self::probe() {
            Ok(()) => {
                debug!("io_uring probe succeeded");
                true
            }
            Err(reason) => {
                warn!("io_uring unavailable: {reason}");
                false
            }
        })
    }

    /// Round-trip a no-op through a tiny throwaway ring. Creation alone is
    /// not proof: some hardened kernels expose the syscalls but refuse to
    /// execute anything.
    fn probe() -> Result<(), String> {
        let mut ring = IoRing::new(PROBE_RING_ENTRIES).map_err(|e| e.to_string())?;

        let nop = opcode::Nop::new().build().user_data(PROBE_NOP_TOKEN);
        unsafe {
            ring.ring
                .submission()
                .push(&nop)
                .map_err(|e| format!("probe push refused: {e}"))?;
        }
        ring.ring
            .submit_and_wait(1)
            .map_err(|e| format!("probe submit failed: {e}"))?;

        let mut answered = false;
        ring.process_completions(|token, _| answered |= token == PROBE_NOP_TOKEN);
        if answered {
            Ok(())
        } else {
            Err("no-op completion never arrived".to_string())
        }
    }

    pub fn capacity(&self) -> usize {
        self.depth as usize
    }

    /// Reserve one submission slot and stage a write of `len` bytes at
    /// `data` against `fd`. Returns false when the submission queue is full
    /// (normal backpressure: submit, then retry) or the ring is not
    /// operational.
    ///
    /// The memory behind `data` must stay valid until the completion
    /// carrying `user_token` has been consumed; the caller's in-flight
    /// table guarantees that.
    pub fn prepare_write(&mut self, fd: RawFd, data: *const u8, len: u32, user_token: u64) -> bool {
        if !self.is_operational() {
            return false;
        }

        // Append-mode descriptor: the kernel writes at EOF regardless of
        // the offset, so pass "current position".
        let entry = opcode::Write::new(types::Fd(fd), data, len)
            .offset(u64::MAX)
            .build()
            .user_data(user_token);

        unsafe { self.ring.submission().push(&entry).is_ok() }
    }

    /// Hand all staged submissions to the kernel. A submit error is fatal:
    /// the ring is marked non-operational and refuses further work.
    pub fn submit(&mut self) -> bool {
        if !self.is_operational() {
            return false;
        }
        match self.ring.submit() {
            Ok(_) => true,
            Err(e) => {
                warn!("io_uring submit failed: {e}");
                self.mark_failed();
                false
            }
        }
    }

    /// Drain ready completion entries, delivering `(user_token, result)` to
    /// the owner of each. Already-consumed entries are never redelivered.
    pub fn process_completions(&mut self, mut on_complete: impl FnMut(u64, i32)) {
        for entry in self.ring.completion() {
            on_complete(entry.user_data(), entry.result());
        }
    }

    /// Block until at least one completion is ready or `timeout` elapses.
    /// Returns true on wakeup, false on timeout.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        let timespec = types::Timespec::new()
            .sec(timeout.as_secs())
            .nsec(timeout.subsec_nanos());
        let args = types::SubmitArgs::new().timespec(&timespec);

        match self.ring.submitter().submit_with_args(1, &args) {
            Ok(_) => true,
            Err(e) if e.raw_os_error() == Some(libc::ETIME) => false,
            Err(e) => {
                debug!("io_uring wait interrupted: {e}");
                false
            }
        }
    }

    pub fn is_operational(&self) -> bool {
        self.operational.load(Ordering::Acquire)
    }

    pub fn mark_failed(&self) {
        self.operational.store(false, Ordering::Release);
    }
}
