use std::fmt::{self, Debug};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum InvalidAppKeyError {
    #[error("expected 16 bytes, got {0}")]
    Length(usize),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// A 16-byte LoRaWAN root key.
///
/// Keys are generated on the host and never read back from the device.
#[derive(Clone, PartialEq, Eq)]
pub struct AppKey([u8; AppKey::LEN]);

impl AppKey {
    pub const LEN: usize = 16;

    /// Generate a new key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    pub fn to_hex_upper(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl Debug for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppKey(***)")
    }
}

impl FromStr for AppKey {
    type Err = InvalidAppKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; Self::LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| InvalidAppKeyError::Length(bytes.len()))?;
        Ok(Self(bytes))
    }
}
