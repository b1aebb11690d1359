use std::io;

use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use loraprov_device::DiscoverError;
use loraprov_monitor::{latest_reading, read_loop, serve};

use crate::cli::MonitorArgs;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),

    #[error("failed to open serial port: {0}")]
    Open(#[from] tokio_serial::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("readings API failed: {0}")]
    Serve(#[source] io::Error),
}

/// Stream readings from the serial port into the readings API until
/// cancelled. Stops the server when the port closes.
#[instrument(name = "monitor", skip_all, err)]
pub async fn run(args: MonitorArgs, cancel: CancellationToken) -> Result<(), MonitorError> {
    let port = args.serial.resolve_port()?;
    let stream = tokio_serial::new(&port, args.serial.baud_rate).open_native_async()?;
    debug!(port = %port, "serial port open");

    let listener = TcpListener::bind(args.listen)
        .await
        .map_err(|source| MonitorError::Bind {
            addr: args.listen,
            source,
        })?;

    let (latest_tx, latest_rx) = latest_reading();
    let server = tokio::spawn(serve(listener, latest_rx, cancel.clone()));

    read_loop(BufReader::new(stream), latest_tx, cancel.clone()).await;

    // the reader only stops on cancellation or a closed port
    cancel.cancel();
    match server.await {
        Ok(result) => result.map_err(MonitorError::Serve),
        Err(err) => Err(MonitorError::Serve(io::Error::other(err))),
    }
}
