use tracing::{info, instrument, warn};

use loraprov_util::types::{AppKey, DevEui};

use crate::allocator::IdentityAllocator;
use crate::inventory::{InventoryClient, InventoryError};
use crate::registry::{DeviceRecord, RegistrationError, Registry};

/// Outcome of a registration where all registry steps succeeded
#[derive(Debug)]
pub struct Registration {
    pub record: DeviceRecord,
    /// The inventory write is bookkeeping only, its failure does not undo
    /// the registry record
    pub inventory: Result<(), InventoryError>,
}

/// Creates a device across the registry roles, then records it in the
/// inventory.
///
/// There is no rollback: when a registry step fails the steps before it stay
/// applied and the registry is left holding a partially configured device.
/// Registering the same EUI again does not pick up that record, it allocates
/// a fresh name.
pub struct Orchestrator {
    registry: Registry,
    inventory: InventoryClient,
    allocator: IdentityAllocator,
}

impl Orchestrator {
    pub fn new(
        registry: Registry,
        inventory: InventoryClient,
        allocator: IdentityAllocator,
    ) -> Self {
        Self {
            registry,
            inventory,
            allocator,
        }
    }

    /// Register the device with the remote services.
    ///
    /// Registry steps run strictly in order and the first failure aborts the
    /// rest, including the inventory write.
    #[instrument(skip_all, fields(eui = %dev_eui), err)]
    pub async fn register(
        &mut self,
        dev_eui: DevEui,
        app_key: AppKey,
    ) -> Result<Registration, RegistrationError> {
        let device_id = self.allocator.allocate(&self.inventory).await;
        let record = DeviceRecord::new(device_id, dev_eui, app_key, self.registry.config());

        self.registry.create(&record).await?;
        self.registry.configure_network_server(&record).await?;
        self.registry.configure_application_server(&record).await?;
        self.registry.configure_join_server(&record).await?;
        info!(device_id = %record.device_id, "device registered");

        let inventory = self.inventory.register(&record.device_id, &dev_eui).await;
        if let Err(err) = &inventory {
            warn!("device registered but not added to the inventory: {err}");
        }

        Ok(Registration { record, inventory })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::tests::test_config as inventory_config;
    use crate::registry::RegistrationStep;
    use crate::registry::tests::test_config as registry_config;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    const NS_PATH: &str = "/api/v3/ns/applications/climate-guard/devices/auto-8";
    const AS_PATH: &str = "/api/v3/as/applications/climate-guard/devices/auto-8";
    const JS_PATH: &str = "/api/v3/js/applications/climate-guard/devices/auto-8";
    const CREATE_PATH: &str = "/api/v3/applications/climate-guard/devices";

    fn eui() -> DevEui {
        "AA:BB:CC:DD:EE:FF:00:11".parse().unwrap()
    }

    async fn mock_inventory_listing(server: &mut ServerGuard, body: &str) -> Mock {
        server
            .mock("GET", "/devices")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    async fn mock_step(server: &mut ServerGuard, method: &str, path: &str, status: usize) -> Mock {
        server
            .mock(method, path)
            .with_status(status)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_register_runs_all_steps_then_inventory() {
        let mut registry_server = Server::new_async().await;
        let mut inventory_server = Server::new_async().await;

        mock_inventory_listing(
            &mut inventory_server,
            r#"{"data": [{"name": "auto-3"}, {"name": "auto-7"}, {"name": "device-9"}]}"#,
        )
        .await;
        let post = inventory_server
            .mock("POST", "/devices")
            .match_body(Matcher::Json(
                json!({"name": "auto-8", "deveui": "AABBCCDDEEFF0011"}),
            ))
            .with_status(201)
            .create_async()
            .await;

        let create = mock_step(&mut registry_server, "POST", CREATE_PATH, 201).await;
        let ns = mock_step(&mut registry_server, "PUT", NS_PATH, 200).await;
        let as_ = mock_step(&mut registry_server, "PUT", AS_PATH, 200).await;
        let js = mock_step(&mut registry_server, "PUT", JS_PATH, 200).await;

        let mut inventory = inventory_config(inventory_server.url());
        inventory.page_size = 100;
        let mut orchestrator = Orchestrator::new(
            Registry::new(registry_config(registry_server.url())),
            InventoryClient::new(inventory),
            IdentityAllocator::new("auto"),
        );

        let registration = orchestrator
            .register(eui(), AppKey::generate())
            .await
            .unwrap();

        assert_eq!(registration.record.device_id, "auto-8");
        assert!(registration.inventory.is_ok());
        for mock in [create, ns, as_, js, post] {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_network_server_failure_stops_later_steps() {
        let mut registry_server = Server::new_async().await;
        let mut inventory_server = Server::new_async().await;

        mock_inventory_listing(&mut inventory_server, r#"{"data": [{"name": "auto-7"}]}"#).await;
        let post = inventory_server
            .mock("POST", "/devices")
            .expect(0)
            .create_async()
            .await;

        let create = mock_step(&mut registry_server, "POST", CREATE_PATH, 201).await;
        let ns = registry_server
            .mock("PUT", NS_PATH)
            .with_status(500)
            .with_body("frequency plan unavailable")
            .create_async()
            .await;
        let as_ = registry_server
            .mock("PUT", AS_PATH)
            .expect(0)
            .create_async()
            .await;
        let js = registry_server
            .mock("PUT", JS_PATH)
            .expect(0)
            .create_async()
            .await;

        let mut orchestrator = Orchestrator::new(
            Registry::new(registry_config(registry_server.url())),
            InventoryClient::new(inventory_config(inventory_server.url())),
            IdentityAllocator::new("auto"),
        );

        let err = orchestrator
            .register(eui(), AppKey::generate())
            .await
            .unwrap_err();

        assert_eq!(err.step(), RegistrationStep::NetworkServer);
        assert!(err.to_string().contains("frequency plan unavailable"));
        for mock in [create, ns, as_, js, post] {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_create_failure_aborts_immediately() {
        let mut registry_server = Server::new_async().await;
        let mut inventory_server = Server::new_async().await;

        mock_inventory_listing(&mut inventory_server, r#"{"data": []}"#).await;
        registry_server
            .mock("POST", "/api/v3/applications/climate-guard/devices")
            .with_status(409)
            .with_body("end device already exists")
            .create_async()
            .await;
        let ns = registry_server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut orchestrator = Orchestrator::new(
            Registry::new(registry_config(registry_server.url())),
            InventoryClient::new(inventory_config(inventory_server.url())),
            IdentityAllocator::new("auto"),
        );

        let err = orchestrator
            .register(eui(), AppKey::generate())
            .await
            .unwrap_err();

        assert_eq!(err.step(), RegistrationStep::Create);
        ns.assert_async().await;
    }

    #[tokio::test]
    async fn test_inventory_failure_keeps_registration() {
        let mut registry_server = Server::new_async().await;
        let mut inventory_server = Server::new_async().await;

        mock_inventory_listing(&mut inventory_server, r#"{"data": []}"#).await;
        inventory_server
            .mock("POST", "/devices")
            .with_status(500)
            .create_async()
            .await;
        registry_server
            .mock("POST", CREATE_PATH)
            .with_status(201)
            .create_async()
            .await;
        registry_server
            .mock("PUT", Matcher::Regex(r"^/api/v3/(ns|as|js)/".to_string()))
            .with_status(200)
            .expect(3)
            .create_async()
            .await;

        let mut orchestrator = Orchestrator::new(
            Registry::new(registry_config(registry_server.url())),
            InventoryClient::new(inventory_config(inventory_server.url())),
            IdentityAllocator::new("auto"),
        );

        let registration = orchestrator
            .register(eui(), AppKey::generate())
            .await
            .unwrap();

        assert_eq!(registration.record.device_id, "auto-1");
        assert!(matches!(
            registration.inventory,
            Err(InventoryError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, _))
        ));
    }

    // Registering an EUI that already has a complete record is not detected:
    // a new name is allocated and the registry is asked for a second device.
    #[tokio::test]
    async fn test_reregistering_same_eui_allocates_new_name() {
        let mut registry_server = Server::new_async().await;
        let mut inventory_server = Server::new_async().await;

        inventory_server
            .mock("GET", "/devices")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": [{"name": "auto-1", "deveui": "AABBCCDDEEFF0011"}]}"#)
            .create_async()
            .await;
        inventory_server
            .mock("POST", "/devices")
            .with_status(201)
            .expect(2)
            .create_async()
            .await;
        registry_server
            .mock("POST", CREATE_PATH)
            .with_status(201)
            .expect(2)
            .create_async()
            .await;
        registry_server
            .mock("PUT", Matcher::Any)
            .with_status(200)
            .expect(6)
            .create_async()
            .await;

        let mut orchestrator = Orchestrator::new(
            Registry::new(registry_config(registry_server.url())),
            InventoryClient::new(inventory_config(inventory_server.url())),
            IdentityAllocator::new("auto"),
        );

        let first = orchestrator.register(eui(), AppKey::generate()).await.unwrap();
        let second = orchestrator.register(eui(), AppKey::generate()).await.unwrap();

        assert_eq!(first.record.device_id, "auto-2");
        assert_eq!(second.record.device_id, "auto-3");
        assert_eq!(first.record.dev_eui, second.record.dev_eui);
    }
}
