//! Value types shared by the provisioning crates.

pub mod http;
pub mod types;
