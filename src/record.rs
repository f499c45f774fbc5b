use chrono::{DateTime, Utc};

/// Severity of a log record. All severities end up in the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

/// One log event, created at the producer call site and moved through the
/// queue to the worker. Destroyed once its bytes have been serialized into
/// a write buffer.
#[derive(Debug)]
pub struct Record {
    pub level: Severity,
    pub payload: String,
    pub thread_id: i32,
    pub timestamp: DateTime<Utc>,
    #[cfg(feature = "sequence-tracking")]
    pub sequence: u64,
}

impl Record {
    /// Capture a record on the calling thread. The payload has already been
    /// merged with its formatting arguments by the caller.
    pub fn new(level: Severity, payload: String) -> Self {
        Record {
            level,
            payload,
            thread_id: current_thread_id(),
            timestamp: Utc::now(),
            #[cfg(feature = "sequence-tracking")]
            sequence: 0,
        }
    }
}

/// Kernel thread id of the calling thread, cached per thread.
pub fn current_thread_id() -> i32 {
    thread_local! {
        static TID: i32 = unsafe { libc::gettid() as i32 };
    }
    TID.with(|tid| *tid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_renders_uppercase_names() {
        assert_eq!(Severity::Info.as_str(), "INFO");
        assert_eq!(Severity::Warn.as_str(), "WARN");
        assert_eq!(Severity::Error.as_str(), "ERROR");
    }

    #[test]
    fn record_captures_calling_thread() {
        let record = Record::new(Severity::Info, "hello".to_string());
        assert_eq!(record.thread_id, current_thread_id());

        let other = std::thread::spawn(|| Record::new(Severity::Info, "there".to_string()))
            .join()
            .unwrap();
        assert_ne!(other.thread_id, record.thread_id);
    }
}
