use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, field, info, instrument, warn};

use loraprov_util::types::{AppKey, DevEui};

use crate::command::{Command, Request, check_ack};
use crate::error::{DeviceError, ExchangeError};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// Runs command exchanges against a device over an owned transport.
///
/// The transport is released (and for a serial port, closed) when the client
/// is dropped, whichever way the caller leaves.
pub struct DeviceClient<T> {
    transport: T,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<T: Transport> DeviceClient<T> {
    pub fn new(transport: T, cancel: CancellationToken) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            cancel,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read the device EUI, retrying until the device confirms.
    #[instrument(skip_all, fields(attempts = field::Empty, eui = field::Empty), err)]
    pub async fn read_identity(&mut self) -> Result<DevEui, DeviceError> {
        let frame = Request::ReadIdentity.encode()?;
        let policy = self.retry.clone();
        let cancel = self.cancel.clone();
        let eui = policy
            .retry(&cancel, async |_| self.try_read_identity(&frame).await)
            .await?;

        Span::current().record("eui", field::display(&eui));
        info!("device identity confirmed");
        Ok(eui)
    }

    /// Store the AppKey on the device, retrying until the device confirms.
    #[instrument(skip_all, fields(attempts = field::Empty), err)]
    pub async fn write_app_key(&mut self, key: &AppKey) -> Result<(), DeviceError> {
        let frame = Request::WriteAppKey(key).encode()?;
        let policy = self.retry.clone();
        let cancel = self.cancel.clone();
        policy
            .retry(&cancel, async |_| {
                self.exchange(Command::WriteAppKey, &frame, 0)
                    .await
                    .map(|_| ())
            })
            .await?;

        info!("app key write confirmed");
        Ok(())
    }

    /// Write a diagnostic string into device storage.
    ///
    /// Single attempt, failures are for the caller to log.
    #[instrument(skip_all, fields(len = value.len()), err)]
    pub async fn write_test_string(&mut self, value: &str) -> Result<(), DeviceError> {
        let frame = Request::WriteTestString(value).encode()?;
        self.exchange(Command::WriteTestString, &frame, 0).await?;
        debug!("test string write confirmed");
        Ok(())
    }

    async fn try_read_identity(&mut self, frame: &[u8]) -> Result<DevEui, ExchangeError> {
        let payload = self
            .exchange(Command::ReadIdentity, frame, DevEui::LEN)
            .await?;
        // exchange guarantees the length
        DevEui::from_slice(&payload).map_err(|_| ExchangeError::IncompleteResponse {
            expected: DevEui::LEN,
            received: payload.len(),
        })
    }

    /// One request/acknowledgement round trip, followed by reading exactly
    /// `payload_len` bytes when the device confirmed.
    async fn exchange(
        &mut self,
        command: Command,
        frame: &[u8],
        payload_len: usize,
    ) -> Result<Vec<u8>, ExchangeError> {
        if let Err(err) = self.transport.discard_input() {
            warn!("failed to discard stale input: {err}");
        }
        self.transport.send(frame).await?;
        debug!(command = command.name(), "frame sent");

        let mut ack = [0u8; 1];
        let first = match self.transport.receive(&mut ack).await? {
            0 => None,
            _ => Some(ack[0]),
        };
        check_ack(first)?;

        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            let received = self.transport.receive(&mut payload).await?;
            if received < payload_len {
                return Err(ExchangeError::IncompleteResponse {
                    expected: payload_len,
                    received,
                });
            }
        }
        Ok(payload)
    }
}
