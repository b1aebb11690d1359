/*
This module is home to everything related to the remote services a new
sensor unit is registered with.

The device registry splits one logical LoRaWAN device across network,
application and join server records that have to be created one by one.
The inventory service keeps a flat list of provisioned units and is also
where the next human readable device name is derived from.
*/

mod allocator;
mod config;
mod inventory;
mod orchestrator;
mod registry;

pub use allocator::IdentityAllocator;
pub use config::{InventoryConfig, LorawanConfig, RegistryConfig, RequestConfig};
pub use inventory::{InventoryClient, InventoryEntry, InventoryError};
pub use orchestrator::{Orchestrator, Registration};
pub use registry::{DeviceRecord, RegistrationError, RegistrationStep, Registry};
