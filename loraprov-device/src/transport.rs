use std::future::Future;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, instrument};

/// A half-duplex byte channel to the device.
///
/// There is no delivery guarantee and no framing: a read simply returns
/// whatever arrived before the read timeout expired.
pub trait Transport: Send {
    /// Write the full frame to the device.
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Fill `buf` with incoming bytes, giving up once the read timeout
    /// expires. Returns how many bytes were read, zero meaning nothing came.
    fn receive(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Drop anything received but not read yet.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport> Transport for &mut T {
    fn send(&mut self, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        (**self).send(frame)
    }

    fn receive(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        (**self).receive(buf)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound for a single read
    pub timeout: Duration,
}

impl SerialConfig {
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
}

/// A [`Transport`] over a local serial port.
///
/// The port is opened on construction and closed when the value is dropped.
pub struct SerialTransport {
    stream: SerialStream,
    timeout: Duration,
}

impl SerialTransport {
    #[instrument(skip_all, fields(port = %config.port, baud_rate = config.baud_rate), err)]
    pub fn open(config: &SerialConfig) -> Result<Self, tokio_serial::Error> {
        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .timeout(config.timeout)
            .open_native_async()?;
        debug!("port open");
        Ok(Self {
            stream,
            timeout: config.timeout,
        })
    }
}

impl Transport for SerialTransport {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await
    }

    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + self.timeout;
        let mut filled = 0;
        while filled < buf.len() {
            match timeout_at(deadline, self.stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(err)) => return Err(err),
                // nothing else arrived in time
                Err(_) => break,
            }
        }
        Ok(filled)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.stream.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("no serial ports found")]
    NoPorts,

    #[error("more than one serial port found, pick one of: {}", .0.join(", "))]
    Ambiguous(Vec<String>),

    #[error("failed to list serial ports: {0}")]
    List(#[from] tokio_serial::Error),
}

/// Find the port of the attached device.
///
/// Only succeeds when exactly one serial port is present.
pub fn discover_port() -> Result<String, DiscoverError> {
    let mut ports: Vec<String> = tokio_serial::available_ports()?
        .into_iter()
        .map(|info| info.port_name)
        .collect();

    match ports.len() {
        0 => Err(DiscoverError::NoPorts),
        1 => Ok(ports.remove(0)),
        _ => Err(DiscoverError::Ambiguous(ports)),
    }
}
