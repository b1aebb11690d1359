use std::time::Duration;

use loraprov_util::http::Uri;
use loraprov_util::types::ApiKey;

#[derive(Clone, Debug)]
pub struct RequestConfig {
    pub timeout: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
        }
    }
}

/// LoRaWAN parameters written to the network server record
#[derive(Clone, Debug)]
pub struct LorawanConfig {
    pub lorawan_version: String,
    pub phy_version: String,
    pub frequency_plan_id: String,
    pub supports_join: bool,
    pub rx2_data_rate_index: u8,
    pub rx2_frequency: u64,
}

impl Default for LorawanConfig {
    fn default() -> Self {
        Self {
            lorawan_version: "MAC_V1_0_2".to_string(),
            phy_version: "PHY_V1_0_2_REV_B".to_string(),
            frequency_plan_id: "EU_863_870".to_string(),
            supports_join: true,
            rx2_data_rate_index: 0,
            rx2_frequency: 869_525_000,
        }
    }
}

/// Device registry API configuration
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub api_endpoint: Uri,
    pub api_key: ApiKey,
    pub application_id: String,
    /// Address of the cluster hosting all three server roles
    pub server_address: String,
    pub lorawan: LorawanConfig,
    pub request: RequestConfig,
}

impl RegistryConfig {
    pub const DEFAULT_SERVER_ADDRESS: &str = "eu1.cloud.thethings.network";
}

/// Inventory API configuration
#[derive(Clone, Debug)]
pub struct InventoryConfig {
    pub api_endpoint: Uri,
    pub api_key: ApiKey,
    pub page_size: u32,
    pub request: RequestConfig,
}

impl InventoryConfig {
    pub const DEFAULT_PAGE_SIZE: u32 = 100;
}
