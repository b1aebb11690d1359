use loraprov_util::types::AppKey;

use crate::error::{DeviceError, ExchangeError};

/// Acknowledgement byte sent by the device on success
pub const ACK: u8 = 0xAA;

/// Error sentinel sent by the device on failure
pub const ERROR: u8 = 0xEE;

/// Command identifiers, always the first byte of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    ReadIdentity = 0xEF,
    WriteTestString = 0xEE,
    WriteAppKey = 0xF0,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ReadIdentity => "read-identity",
            Command::WriteTestString => "write-test-string",
            Command::WriteAppKey => "write-app-key",
        }
    }
}

/// A host to device request
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    /// `0xEF`, no payload
    ReadIdentity,
    /// `0xEE`, one length byte then the UTF-8 string
    WriteTestString(&'a str),
    /// `0xF0`, then the 16 raw key bytes
    WriteAppKey(&'a AppKey),
}

impl Request<'_> {
    pub fn command(&self) -> Command {
        match self {
            Request::ReadIdentity => Command::ReadIdentity,
            Request::WriteTestString(_) => Command::WriteTestString,
            Request::WriteAppKey(_) => Command::WriteAppKey,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, DeviceError> {
        let mut frame = vec![self.command() as u8];
        match self {
            Request::ReadIdentity => {}
            Request::WriteTestString(s) => {
                let len =
                    u8::try_from(s.len()).map_err(|_| DeviceError::PayloadTooLong(s.len()))?;
                frame.push(len);
                frame.extend_from_slice(s.as_bytes());
            }
            Request::WriteAppKey(key) => frame.extend_from_slice(key.as_bytes()),
        }
        Ok(frame)
    }
}

/// Classify the first byte of a device reply.
///
/// Anything other than [`ACK`] is a missing confirmation. The error sentinel
/// is reported separately but is just as retryable, the unit may recover
/// after a reboot.
pub fn check_ack(first: Option<u8>) -> Result<(), ExchangeError> {
    match first {
        Some(ACK) => Ok(()),
        Some(ERROR) => Err(ExchangeError::ErrorSentinel),
        other => Err(ExchangeError::NoConfirmation(other)),
    }
}
