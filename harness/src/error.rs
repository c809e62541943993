use std::panic::Location;

use thiserror::Error;

/// Every failure the harness can detect. None of them are recoverable: a
/// benchmark run either completes with trustworthy numbers or stops.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{label} answer has the wrong size: {actual} instead of {expected}")]
    WrongSize {
        label: String,
        expected: usize,
        actual: usize,
    },

    #[error("{label} answer[{index}] is wrong: {actual} instead of {expected}")]
    WrongCount {
        label: String,
        index: usize,
        expected: u32,
        actual: u32,
    },

    #[error("{label} answer[{index}] is wrong: {actual:.6} instead of {expected:.6}")]
    WrongValue {
        label: String,
        index: usize,
        expected: f64,
        actual: f64,
    },

    #[error("{label} answer is too far off: {actual:15.8e} instead of {expected:15.8e}")]
    OutOfTolerance {
        label: String,
        expected: f64,
        actual: f64,
    },

    #[error("bucket {bucket} has the wrong value: {actual} instead of {expected}")]
    UnbalancedBucket {
        bucket: usize,
        expected: u32,
        actual: u32,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("no GPU adapter available")]
    NoAdapter,

    #[error("GPU error: {message} ({location})")]
    Gpu {
        message: String,
        location: &'static Location<'static>,
    },
}

impl Error {
    /// Builds a GPU error tagged with the caller's source location.
    #[track_caller]
    pub fn gpu(message: impl Into<String>) -> Self {
        Error::Gpu {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, Error>;
