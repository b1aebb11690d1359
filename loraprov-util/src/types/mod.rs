mod api_key;
mod app_key;
mod eui;

pub use api_key::ApiKey;
pub use app_key::{AppKey, InvalidAppKeyError};
pub use eui::{DevEui, InvalidEuiError};

// Just an alias for more descriptive code
pub type DeviceId = String;
