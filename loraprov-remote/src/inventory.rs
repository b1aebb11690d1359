use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, debug, field, instrument};

use loraprov_util::http::InvalidUriError;
use loraprov_util::types::DevEui;

use crate::config::InventoryConfig;

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Invalid inventory endpoint URI: {0}")]
    InvalidRemote(#[from] InvalidUriError),

    #[error("Inventory request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Inventory returned error: ({0}) {1}")]
    Status(StatusCode, String),
}

/// A provisioned unit as listed by the inventory
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct InventoryEntry {
    pub name: String,
    #[serde(default)]
    pub deveui: Option<String>,
}

#[derive(Deserialize)]
struct DevicePage {
    data: Vec<InventoryEntry>,
}

#[derive(Serialize)]
struct NewDevice<'a> {
    name: &'a str,
    deveui: String,
}

pub struct InventoryClient {
    client: Client,
    config: InventoryConfig,
}

impl InventoryClient {
    pub fn new(config: InventoryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    /// Fetch one page of the device list. Pages start at 1.
    #[instrument(skip(self), fields(entries = field::Empty), err)]
    pub async fn list_page(&self, page: u32) -> Result<Vec<InventoryEntry>, InventoryError> {
        let query = format!("page={page}&limit={}", self.config.page_size);
        let endpoint = self.config.api_endpoint.join("/devices", Some(&query))?;

        let response = self
            .client
            .get(endpoint.to_string())
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .timeout(self.config.request.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let err_code = response.status();
            let err_msg = response.text().await.unwrap_or_default();
            return Err(InventoryError::Status(err_code, err_msg));
        }

        let page: DevicePage = response.json().await?;
        Span::current().record("entries", page.data.len());
        Ok(page.data)
    }

    /// Add a provisioned unit to the inventory.
    #[instrument(skip(self), fields(result = field::Empty), err)]
    pub async fn register(&self, name: &str, dev_eui: &DevEui) -> Result<(), InventoryError> {
        let endpoint = self.config.api_endpoint.join("/devices", None)?;
        let body = NewDevice {
            name,
            deveui: dev_eui.to_compact(),
        };

        debug!("calling inventory");
        let response = self
            .client
            .post(endpoint.to_string())
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .timeout(self.config.request.timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err_code = response.status();
            let err_msg = response.text().await.unwrap_or_default();
            return Err(InventoryError::Status(err_code, err_msg));
        }

        Span::current().record("result", field::display(response.status()));
        Ok(())
    }
}
