use clap::{ArgAction, Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use loraprov_device::{DiscoverError, SerialConfig, discover_port};
use loraprov_remote::{IdentityAllocator, InventoryConfig, LorawanConfig, RegistryConfig};
use loraprov_util::http::Uri;
use loraprov_util::types::ApiKey;

use crate::firmware::Uploader;

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Program identity into an attached unit and register it remotely
    Provision(ProvisionArgs),

    /// Show live readings from an attached unit
    Monitor(MonitorArgs),
}

#[derive(Clone, Debug, Args)]
pub struct SerialArgs {
    /// Serial port of the device, auto-detected if there is only one
    #[arg(env = "LORAPROV_SERIAL_PORT", long = "port", value_name = "path")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(
        env = "LORAPROV_BAUD_RATE",
        long = "baud-rate",
        value_name = "int",
        default_value_t = SerialConfig::DEFAULT_BAUD_RATE
    )]
    pub baud_rate: u32,
}

impl SerialArgs {
    /// The configured port, or the only one attached
    pub fn resolve_port(&self) -> Result<String, DiscoverError> {
        match &self.port {
            Some(port) => Ok(port.clone()),
            None => discover_port(),
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub serial: SerialArgs,

    /// Serial read timeout in milliseconds
    #[arg(
        env = "LORAPROV_SERIAL_TIMEOUT_MS",
        long = "serial-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration,
        default_value = "1000"
    )]
    pub serial_timeout: Duration,

    /// API key for the device registry
    #[arg(env = "TTN_API_KEY", long = "registry-api-key", value_name = "key")]
    pub registry_api_key: ApiKey,

    /// Registry application the device is created in
    #[arg(env = "TTN_APP_ID", long = "application-id", value_name = "id")]
    pub application_id: String,

    /// Registry API endpoint URI, defaults to https://<server-address>
    #[arg(
        env = "TTN_API_ENDPOINT",
        long = "registry-api-endpoint",
        value_name = "uri"
    )]
    pub registry_api_endpoint: Option<Uri>,

    /// Address of the network, application and join servers
    #[arg(
        env = "TTN_SERVER_ADDRESS",
        long = "server-address",
        value_name = "host",
        default_value = RegistryConfig::DEFAULT_SERVER_ADDRESS
    )]
    pub server_address: String,

    /// LoRaWAN MAC version
    #[arg(
        env = "LORAPROV_LORAWAN_VERSION",
        long = "lorawan-version",
        value_name = "str",
        default_value = "MAC_V1_0_2"
    )]
    pub lorawan_version: String,

    /// LoRaWAN regional parameters version
    #[arg(
        env = "LORAPROV_PHY_VERSION",
        long = "phy-version",
        value_name = "str",
        default_value = "PHY_V1_0_2_REV_B"
    )]
    pub phy_version: String,

    /// Frequency plan of the device
    #[arg(
        env = "LORAPROV_FREQUENCY_PLAN",
        long = "frequency-plan",
        value_name = "id",
        default_value = "EU_863_870"
    )]
    pub frequency_plan: String,

    /// Whether the device joins over the air
    #[arg(
        env = "LORAPROV_SUPPORTS_JOIN",
        long = "supports-join",
        value_name = "bool",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub supports_join: bool,

    /// API key for the inventory service
    #[arg(env = "INVENTORY_API_KEY", long = "inventory-api-key", value_name = "key")]
    pub inventory_api_key: ApiKey,

    /// Inventory API endpoint URI
    #[arg(
        env = "INVENTORY_API_ENDPOINT",
        long = "inventory-api-endpoint",
        value_name = "uri"
    )]
    pub inventory_api_endpoint: Uri,

    /// Prefix for generated device names
    #[arg(
        env = "LORAPROV_NAME_PREFIX",
        long = "name-prefix",
        value_name = "str",
        default_value = IdentityAllocator::DEFAULT_PREFIX
    )]
    pub name_prefix: String,

    /// Remote request timeout in milliseconds
    #[arg(
        env = "LORAPROV_REQUEST_TIMEOUT_MS",
        long = "request-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration,
        default_value = "30000"
    )]
    pub request_timeout: Duration,

    /// Diagnostic string written to device storage after the identity read
    #[arg(long = "test-string", value_name = "str")]
    pub test_string: Option<String>,

    /// PlatformIO project to build and upload before provisioning
    #[arg(
        env = "LORAPROV_FIRMWARE_PROJECT",
        long = "firmware-project",
        value_name = "dir"
    )]
    pub firmware_project: Option<PathBuf>,

    /// PlatformIO environment to upload
    #[arg(
        env = "LORAPROV_FIRMWARE_ENV",
        long = "firmware-env",
        value_name = "name",
        requires = "firmware_project"
    )]
    pub firmware_env: Option<String>,

    /// PlatformIO command used for the upload
    #[arg(
        env = "LORAPROV_PIO_PATH",
        long = "pio-path",
        value_name = "path",
        default_value = Uploader::DEFAULT_PROGRAM
    )]
    pub pio_path: String,
}

impl ProvisionArgs {
    pub fn registry_config(&self) -> Result<RegistryConfig, loraprov_util::http::InvalidUriError> {
        let api_endpoint = match &self.registry_api_endpoint {
            Some(uri) => uri.clone(),
            None => format!("https://{}", self.server_address).parse()?,
        };

        Ok(RegistryConfig {
            api_endpoint,
            api_key: self.registry_api_key.clone(),
            application_id: self.application_id.clone(),
            server_address: self.server_address.clone(),
            lorawan: LorawanConfig {
                lorawan_version: self.lorawan_version.clone(),
                phy_version: self.phy_version.clone(),
                frequency_plan_id: self.frequency_plan.clone(),
                supports_join: self.supports_join,
                ..LorawanConfig::default()
            },
            request: loraprov_remote::RequestConfig {
                timeout: self.request_timeout,
            },
        })
    }

    pub fn inventory_config(&self) -> InventoryConfig {
        InventoryConfig {
            api_endpoint: self.inventory_api_endpoint.clone(),
            api_key: self.inventory_api_key.clone(),
            page_size: InventoryConfig::DEFAULT_PAGE_SIZE,
            request: loraprov_remote::RequestConfig {
                timeout: self.request_timeout,
            },
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub serial: SerialArgs,

    /// Listen address of the readings API
    #[arg(
        env = "LORAPROV_MONITOR_LISTEN",
        long = "listen",
        value_name = "addr",
        default_value = "127.0.0.1:5000"
    )]
    pub listen: SocketAddr,
}

pub fn parse() -> Cli {
    Parser::parse()
}
