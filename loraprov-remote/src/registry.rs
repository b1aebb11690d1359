use std::fmt::{self, Display};

use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{Span, debug, field, instrument};

use loraprov_util::http::InvalidUriError;
use loraprov_util::types::{AppKey, DevEui, DeviceId};

use crate::config::RegistryConfig;

/// The four remote writes that bring a device record into existence, in
/// the order they have to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    Create,
    NetworkServer,
    ApplicationServer,
    JoinServer,
}

impl Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationStep::Create => "create",
            RegistrationStep::NetworkServer => "network-server",
            RegistrationStep::ApplicationServer => "application-server",
            RegistrationStep::JoinServer => "join-server",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{step} step: invalid registry endpoint URI: {source}")]
    InvalidRemote {
        step: RegistrationStep,
        source: InvalidUriError,
    },

    #[error("{step} step: request failed: {source}")]
    Request {
        step: RegistrationStep,
        source: reqwest::Error,
    },

    #[error("{step} step: registry returned error: ({status}) {body}")]
    Status {
        step: RegistrationStep,
        status: StatusCode,
        body: String,
    },
}

impl RegistrationError {
    pub fn step(&self) -> RegistrationStep {
        match self {
            RegistrationError::InvalidRemote { step, .. }
            | RegistrationError::Request { step, .. }
            | RegistrationError::Status { step, .. } => *step,
        }
    }
}

// Field masks. Each PUT is a partial update of the record created by the
// POST, fields not listed here are left alone by the registry.
const CREATE_PATHS: &[&str] = &[
    "name",
    "network_server_address",
    "application_server_address",
    "join_server_address",
];
const NETWORK_SERVER_PATHS: &[&str] = &[
    "ids.dev_eui",
    "ids.join_eui",
    "frequency_plan_id",
    "lorawan_version",
    "lorawan_phy_version",
    "supports_join",
    "mac_settings.rx2_data_rate_index",
    "mac_settings.rx2_frequency",
];
const APPLICATION_SERVER_PATHS: &[&str] = &["ids.dev_eui", "ids.join_eui"];
const JOIN_SERVER_PATHS: &[&str] = &[
    "ids.dev_eui",
    "ids.join_eui",
    "network_server_address",
    "application_server_address",
    "root_keys.app_key.key",
];

/// The registry's view of one device
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub name: String,
    pub dev_eui: DevEui,
    pub join_eui: DevEui,
    pub network_server_address: String,
    pub application_server_address: String,
    pub join_server_address: String,
    pub lorawan_version: String,
    pub phy_version: String,
    pub frequency_plan_id: String,
    pub supports_join: bool,
    pub rx2_data_rate_index: u8,
    pub rx2_frequency: u64,
    pub app_key: AppKey,
}

impl DeviceRecord {
    /// The join EUI is not used by the fleet and stays all zeros
    pub const JOIN_EUI: DevEui = DevEui::new([0; 8]);

    pub fn new(
        device_id: DeviceId,
        dev_eui: DevEui,
        app_key: AppKey,
        config: &RegistryConfig,
    ) -> Self {
        let lorawan = &config.lorawan;
        Self {
            name: format!("Provisioned on {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
            device_id,
            dev_eui,
            join_eui: Self::JOIN_EUI,
            network_server_address: config.server_address.clone(),
            application_server_address: config.server_address.clone(),
            join_server_address: config.server_address.clone(),
            lorawan_version: lorawan.lorawan_version.clone(),
            phy_version: lorawan.phy_version.clone(),
            frequency_plan_id: lorawan.frequency_plan_id.clone(),
            supports_join: lorawan.supports_join,
            rx2_data_rate_index: lorawan.rx2_data_rate_index,
            rx2_frequency: lorawan.rx2_frequency,
            app_key,
        }
    }

    fn ids(&self, application_id: &str) -> Value {
        json!({
            "device_id": self.device_id,
            "dev_eui": self.dev_eui,
            "join_eui": self.join_eui,
            "application_ids": { "application_id": application_id },
        })
    }
}

/// Client for the per-device endpoints of the registry
pub struct Registry {
    client: Client,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create the device with its identity and server addresses.
    pub async fn create(&self, record: &DeviceRecord) -> Result<(), RegistrationError> {
        let app = &self.config.application_id;
        let body = json!({
            "end_device": {
                "ids": record.ids(app),
                "name": record.name,
                "network_server_address": record.network_server_address,
                "application_server_address": record.application_server_address,
                "join_server_address": record.join_server_address,
            },
            "field_mask": { "paths": CREATE_PATHS },
        });
        let path = format!("/api/v3/applications/{app}/devices");
        self.call(RegistrationStep::Create, Method::POST, &path, body)
            .await
    }

    /// Write the LoRaWAN parameters to the network server record.
    pub async fn configure_network_server(
        &self,
        record: &DeviceRecord,
    ) -> Result<(), RegistrationError> {
        let app = &self.config.application_id;
        let body = json!({
            "end_device": {
                "ids": record.ids(app),
                "frequency_plan_id": record.frequency_plan_id,
                "lorawan_version": record.lorawan_version,
                "lorawan_phy_version": record.phy_version,
                "supports_join": record.supports_join,
                "mac_settings": {
                    "rx2_data_rate_index": { "value": record.rx2_data_rate_index },
                    "rx2_frequency": record.rx2_frequency.to_string(),
                },
            },
            "field_mask": { "paths": NETWORK_SERVER_PATHS },
        });
        let path = format!("/api/v3/ns/applications/{app}/devices/{}", record.device_id);
        self.call(RegistrationStep::NetworkServer, Method::PUT, &path, body)
            .await
    }

    /// Establish the application server record, identity only.
    pub async fn configure_application_server(
        &self,
        record: &DeviceRecord,
    ) -> Result<(), RegistrationError> {
        let app = &self.config.application_id;
        let body = json!({
            "end_device": { "ids": record.ids(app) },
            "field_mask": { "paths": APPLICATION_SERVER_PATHS },
        });
        let path = format!("/api/v3/as/applications/{app}/devices/{}", record.device_id);
        self.call(RegistrationStep::ApplicationServer, Method::PUT, &path, body)
            .await
    }

    /// Hand the AppKey to the join server.
    pub async fn configure_join_server(
        &self,
        record: &DeviceRecord,
    ) -> Result<(), RegistrationError> {
        let app = &self.config.application_id;
        let body = json!({
            "end_device": {
                "ids": record.ids(app),
                "network_server_address": record.network_server_address,
                "application_server_address": record.application_server_address,
                "root_keys": {
                    "app_key": { "key": record.app_key.to_hex_upper() },
                },
            },
            "field_mask": { "paths": JOIN_SERVER_PATHS },
        });
        let path = format!("/api/v3/js/applications/{app}/devices/{}", record.device_id);
        self.call(RegistrationStep::JoinServer, Method::PUT, &path, body)
            .await
    }

    #[instrument(skip(self, path, body), fields(result = field::Empty), err)]
    async fn call(
        &self,
        step: RegistrationStep,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<(), RegistrationError> {
        let endpoint = self
            .config
            .api_endpoint
            .join(path, None)
            .map_err(|source| RegistrationError::InvalidRemote { step, source })?;

        debug!("calling registry");
        let response = self
            .client
            .request(method, endpoint.to_string())
            .bearer_auth(self.config.api_key.as_str())
            .timeout(self.config.request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|source| RegistrationError::Request { step, source })?;

        let status = response.status();
        Span::current().record("result", field::display(status));

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::Status { step, status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{LorawanConfig, RequestConfig};
    use mockito::{Matcher, Server};

    pub(crate) fn test_config(endpoint: String) -> RegistryConfig {
        RegistryConfig {
            api_endpoint: endpoint.parse().unwrap(),
            api_key: "registry-key".into(),
            application_id: "climate-guard".to_string(),
            server_address: RegistryConfig::DEFAULT_SERVER_ADDRESS.to_string(),
            lorawan: LorawanConfig::default(),
            request: RequestConfig::default(),
        }
    }

    fn test_record(config: &RegistryConfig) -> DeviceRecord {
        DeviceRecord::new(
            "auto-8".to_string(),
            "AA:BB:CC:DD:EE:FF:00:11".parse().unwrap(),
            AppKey::new([0xab; 16]),
            config,
        )
    }

    #[tokio::test]
    async fn test_create_posts_identity() {
        let mut server = Server::new_async().await;
        let config = test_config(server.url());
        let mock = server
            .mock("POST", "/api/v3/applications/climate-guard/devices")
            .match_header("authorization", "Bearer registry-key")
            .match_body(Matcher::PartialJson(json!({
                "end_device": {
                    "ids": {
                        "device_id": "auto-8",
                        "dev_eui": "AABBCCDDEEFF0011",
                        "join_eui": "0000000000000000",
                        "application_ids": { "application_id": "climate-guard" },
                    },
                    "network_server_address": "eu1.cloud.thethings.network",
                    "application_server_address": "eu1.cloud.thethings.network",
                    "join_server_address": "eu1.cloud.thethings.network",
                },
                "field_mask": { "paths": CREATE_PATHS },
            })))
            .with_status(201)
            .create_async()
            .await;

        let registry = Registry::new(config.clone());
        registry.create(&test_record(&config)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_network_server_put_carries_field_mask() {
        let mut server = Server::new_async().await;
        let config = test_config(server.url());
        let mock = server
            .mock("PUT", "/api/v3/ns/applications/climate-guard/devices/auto-8")
            .match_body(Matcher::PartialJson(json!({
                "end_device": {
                    "frequency_plan_id": "EU_863_870",
                    "lorawan_version": "MAC_V1_0_2",
                    "lorawan_phy_version": "PHY_V1_0_2_REV_B",
                    "supports_join": true,
                    "mac_settings": {
                        "rx2_data_rate_index": { "value": 0 },
                        "rx2_frequency": "869525000",
                    },
                },
                "field_mask": { "paths": NETWORK_SERVER_PATHS },
            })))
            .with_status(200)
            .create_async()
            .await;

        let registry = Registry::new(config.clone());
        registry
            .configure_network_server(&test_record(&config))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_join_server_put_carries_uppercase_key() {
        let mut server = Server::new_async().await;
        let config = test_config(server.url());
        let mock = server
            .mock("PUT", "/api/v3/js/applications/climate-guard/devices/auto-8")
            .match_body(Matcher::PartialJson(json!({
                "end_device": {
                    "root_keys": { "app_key": { "key": "AB".repeat(16) } },
                },
                "field_mask": { "paths": JOIN_SERVER_PATHS },
            })))
            .with_status(200)
            .create_async()
            .await;

        let registry = Registry::new(config.clone());
        registry
            .configure_join_server(&test_record(&config))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_names_step_and_body() {
        let mut server = Server::new_async().await;
        let config = test_config(server.url());
        server
            .mock("PUT", "/api/v3/as/applications/climate-guard/devices/auto-8")
            .with_status(403)
            .with_body(r#"{"message": "no rights"}"#)
            .create_async()
            .await;

        let registry = Registry::new(config.clone());
        let err = registry
            .configure_application_server(&test_record(&config))
            .await
            .unwrap_err();

        assert_eq!(err.step(), RegistrationStep::ApplicationServer);
        assert!(matches!(
            err,
            RegistrationError::Status { status: StatusCode::FORBIDDEN, ref body, .. }
                if body.contains("no rights")
        ));
    }
}
