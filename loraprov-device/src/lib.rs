/*
This crate talks to a freshly flashed sensor unit over its serial port.

The device understands three single-byte commands: read the device EUI,
write a diagnostic test string and write the LoRaWAN AppKey. It answers
with a single ACK/ERROR byte, optionally followed by a fixed-size payload.
The port carries no framing of its own and the unit may still be booting
when we first talk to it, so identity reads and key writes are retried on a
fixed interval until the device confirms or the attempt budget runs out.
*/

mod client;
mod command;
mod error;
mod retry;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::DeviceClient;
pub use command::{ACK, Command, ERROR, Request};
pub use error::{DeviceError, ExchangeError};
pub use retry::{RetryError, RetryPolicy};
pub use transport::{DiscoverError, SerialConfig, SerialTransport, Transport, discover_port};
