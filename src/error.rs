use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum BlazeLogError {
    InvalidConfig {
        message: String,
    },
    NotInitialized,
    FileOpenFailed {
        context: String,
        source: Box<ErrorSource>,
    },
    RingSetupFailed {
        context: String,
        source: Box<ErrorSource>,
    },
    RotationFailed {
        context: String,
        source: Box<ErrorSource>,
    },
    WorkerSpawnFailed {
        source: Box<ErrorSource>,
    },
    ShutdownTimeout {
        seconds: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSource {
    Io(String),
    Ring(String),
    Custom(String),
}

impl fmt::Display for BlazeLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlazeLogError::InvalidConfig { message } => {
                write!(f, "Invalid configuration: {message}")
            }
            BlazeLogError::NotInitialized => {
                write!(f, "Logger not initialized: call blazelog::init first")
            }
            BlazeLogError::FileOpenFailed { context, source } => {
                write!(f, "File open failed in {context}: {source}")
            }
            BlazeLogError::RingSetupFailed { context, source } => {
                write!(f, "io_uring setup failed in {context}: {source}")
            }
            BlazeLogError::RotationFailed { context, source } => {
                write!(f, "Rotation failed in {context}: {source}")
            }
            BlazeLogError::WorkerSpawnFailed { source } => {
                write!(f, "Failed to spawn worker thread: {source}")
            }
            BlazeLogError::ShutdownTimeout { seconds } => {
                write!(f, "Worker did not stop within {seconds}s shutdown timeout")
            }
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSource::Io(msg) => write!(f, "IO error: {msg}"),
            ErrorSource::Ring(msg) => write!(f, "Ring error: {msg}"),
            ErrorSource::Custom(msg) => write!(f, "Custom error: {msg}"),
        }
    }
}

impl std::error::Error for BlazeLogError {}
impl std::error::Error for ErrorSource {}

impl BlazeLogError {
    pub fn file_open_failed(e: std::io::Error, context: &str) -> Self {
        BlazeLogError::FileOpenFailed {
            context: context.to_string(),
            source: Box::new(ErrorSource::Io(e.to_string())),
        }
    }

    pub fn ring_setup_failed(e: impl fmt::Display, context: &str) -> Self {
        BlazeLogError::RingSetupFailed {
            context: context.to_string(),
            source: Box::new(ErrorSource::Ring(e.to_string())),
        }
    }

    pub fn rotation_failed(e: std::io::Error, context: &str) -> Self {
        BlazeLogError::RotationFailed {
            context: context.to_string(),
            source: Box::new(ErrorSource::Io(e.to_string())),
        }
    }
}
