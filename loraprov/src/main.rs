use std::process::ExitCode;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, trace, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod cli;
mod firmware;
mod monitor;
mod session;

use loraprov_device::{DeviceClient, DiscoverError, SerialConfig, SerialTransport};
use loraprov_remote::{IdentityAllocator, InventoryClient, Orchestrator, Registry};
use loraprov_util::http::InvalidUriError;

use crate::cli::{Command, ProvisionArgs};
use crate::firmware::{UploadError, Uploader};
use crate::session::{Session, SessionReport};

fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(
            // Use some log defaults. These can be overriden using
            // RUST_LOG
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(
                    "info,loraprov=debug,loraprov_device=debug,loraprov_remote=debug,\
                     loraprov_monitor=debug,hyper=error,reqwest=info",
                )
            }),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

/// Cancel `token` on the first Ctrl-C
async fn cancel_on_interrupt(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupted");
            token.cancel();
        }
        Err(err) => warn!("failed to listen for interrupts: {err}"),
    }
}

/// Problems that stop provisioning before a session can start
#[derive(Debug, Error)]
enum SetupError {
    #[error(transparent)]
    Firmware(#[from] UploadError),

    #[error(transparent)]
    Discover(#[from] DiscoverError),

    #[error("failed to open serial port: {0}")]
    Open(#[from] tokio_serial::Error),

    #[error("invalid registry endpoint: {0}")]
    InvalidRemote(#[from] InvalidUriError),
}

#[tokio::main]
async fn main() -> ExitCode {
    initialize_tracing();

    let cli = cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    match cli.command {
        Command::Provision(args) => match provision(args, cancel).await {
            Ok(report) => ExitCode::from(report.exit_code()),
            Err(err) => {
                error!("{err}");
                ExitCode::FAILURE
            }
        },
        Command::Monitor(args) => match monitor::run(args, cancel).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err}");
                ExitCode::FAILURE
            }
        },
    }
}

/// Prepare the unit and remote clients, then run a single session
#[instrument(name = "loraprov", skip_all)]
async fn provision(
    args: ProvisionArgs,
    cancel: CancellationToken,
) -> Result<SessionReport, SetupError> {
    let registry_config = args.registry_config()?;
    let inventory_config = args.inventory_config();
    trace!(
        registry = ?registry_config,
        inventory = ?inventory_config,
        "using config:"
    );

    if let Some(project) = &args.firmware_project {
        Uploader::new(project)
            .program(&args.pio_path)
            .env(args.firmware_env.clone())
            .upload()
            .await?;
    }

    let port = args.serial.resolve_port()?;
    info!(port = %port, "using serial port");
    let transport = SerialTransport::open(&SerialConfig {
        port,
        baud_rate: args.serial.baud_rate,
        timeout: args.serial_timeout,
    })?;

    let orchestrator = Orchestrator::new(
        Registry::new(registry_config),
        InventoryClient::new(inventory_config),
        IdentityAllocator::new(args.name_prefix),
    );

    let report = Session::new(DeviceClient::new(transport, cancel), orchestrator)
        .with_test_string(args.test_string)
        .run()
        .await;

    Ok(report)
}
