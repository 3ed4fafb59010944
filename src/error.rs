// src/error.rs

use std::fmt;

/// Custom `Error` type for the frame pipeline and its collaborators.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// Captures OS-specific error codes from I/O.
    OsError(u32),
    /// The suppressor only runs at 8 kHz or 16 kHz.
    UnsupportedSampleRate(u32),
    /// A frame handed to the suppressor had the wrong byte length.
    FrameLength { expected: usize, actual: usize },
    /// The suppressor was used before `init` or after `uninit`.
    NotInitialized,
    /// A capacity increase asked for more than the configured ceiling.
    CapacityLimit { requested: usize, max: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OsError(code) => write!(f, "OS error with code: {}", code),
            Error::UnsupportedSampleRate(fs) => {
                write!(f, "Unsupported sample rate: {} Hz (expected 8000 or 16000)", fs)
            }
            Error::FrameLength { expected, actual } => {
                write!(f, "Frame is {} bytes, expected {}", actual, expected)
            }
            Error::NotInitialized => write!(f, "Noise suppressor is not initialized"),
            Error::CapacityLimit { requested, max } => {
                write!(f, "Requested capacity {} exceeds the limit of {} bytes", requested, max)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::OsError(e.raw_os_error().unwrap_or(0) as u32)
    }
}

impl Error {
    /// Maps the error to the negative status returned over D-Bus.
    /// Zero is reserved for success.
    pub fn to_status_code(&self) -> i32 {
        match self {
            Error::OsError(_) => -1,
            Error::UnsupportedSampleRate(_) => -2,
            Error::FrameLength { .. } => -3,
            Error::NotInitialized => -4,
            Error::CapacityLimit { .. } => -5,
        }
    }
}
