use std::io;
use thiserror::Error;

use crate::retry::RetryError;

/// Failure of a single command exchange. All of these are transient.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("no confirmation received (first byte: {0:02X?})")]
    NoConfirmation(Option<u8>),

    #[error("device returned ERROR")]
    ErrorSentinel,

    #[error("incomplete response: expected {expected} bytes, got {received}")]
    IncompleteResponse { expected: usize, received: usize },

    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The retry budget ran out without a confirmed exchange
    #[error("device did not confirm after {attempts} attempts: {last}")]
    Timeout { attempts: u32, last: ExchangeError },

    #[error("interrupted")]
    Cancelled,

    /// A single-attempt exchange failed
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("payload of {0} bytes does not fit a one byte length prefix")]
    PayloadTooLong(usize),
}

impl From<RetryError<ExchangeError>> for DeviceError {
    fn from(err: RetryError<ExchangeError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last, .. } => {
                DeviceError::Timeout { attempts, last }
            }
            RetryError::Cancelled => DeviceError::Cancelled,
        }
    }
}
