use serde::Serialize;
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum InvalidEuiError {
    #[error("expected 8 bytes, got {0}")]
    Length(usize),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// An 8-byte LoRaWAN device identifier.
///
/// The display form is the colon separated, uppercase byte list
/// (`AA:BB:CC:DD:EE:FF:00:11`). Remote APIs use the compact form without
/// separators, see [`DevEui::to_compact`]. Parsing accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevEui([u8; DevEui::LEN]);

impl DevEui {
    pub const LEN: usize = 8;

    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidEuiError> {
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| InvalidEuiError::Length(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Uppercase hex without separators, the form used as a lookup key.
    pub fn to_compact(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl Display for DevEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for DevEui {
    type Err = InvalidEuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != ':').collect();
        let bytes = hex::decode(compact)?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for DevEui {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_compact())
    }
}
