//! Wires the REST client in `azure-api` into the provisioning engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use azure_api::{
    AzureClient, BoxPoller, NetworkInterface, ResourceGroup, Result, Subnet, VirtualMachine,
    VirtualNetwork,
};

use crate::cloud::{ClientFactory, CloudApi};
use crate::options::Credentials;

#[async_trait]
impl CloudApi for AzureClient {
    async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup> {
        AzureClient::get_resource_group(self, name).await
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        let group = ResourceGroup {
            location: location.to_string(),
            ..Default::default()
        };
        AzureClient::create_resource_group(self, name, &group).await
    }

    async fn get_virtual_network(&self, resource_group: &str, name: &str) -> Result<VirtualNetwork> {
        AzureClient::get_virtual_network(self, resource_group, name).await
    }

    async fn create_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> Result<BoxPoller<VirtualNetwork>> {
        let poller = self.begin_create_virtual_network(resource_group, name, vnet).await?;
        Ok(Box::new(poller))
    }

    async fn get_subnet(&self, resource_group: &str, vnet_name: &str, name: &str) -> Result<Subnet> {
        AzureClient::get_subnet(self, resource_group, vnet_name, name).await
    }

    async fn create_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        name: &str,
        subnet: &Subnet,
    ) -> Result<BoxPoller<Subnet>> {
        let poller = self
            .begin_create_subnet(resource_group, vnet_name, name, subnet)
            .await?;
        Ok(Box::new(poller))
    }

    async fn create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<BoxPoller<NetworkInterface>> {
        let poller = self.begin_create_network_interface(resource_group, name, nic).await?;
        Ok(Box::new(poller))
    }

    async fn create_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<BoxPoller<VirtualMachine>> {
        let poller = self.begin_create_virtual_machine(resource_group, name, vm).await?;
        Ok(Box::new(poller))
    }

    async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        AzureClient::get_virtual_machine(self, resource_group, name).await
    }

    async fn start_virtual_machine(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>> {
        let poller = self.begin_start_virtual_machine(resource_group, name).await?;
        Ok(Box::new(poller))
    }

    async fn deallocate_virtual_machine(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>> {
        let poller = self.begin_deallocate_virtual_machine(resource_group, name).await?;
        Ok(Box::new(poller))
    }

    async fn delete_virtual_machine(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>> {
        let poller = self.begin_delete_virtual_machine(resource_group, name).await?;
        Ok(Box::new(poller))
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>> {
        let poller = self.begin_delete_disk(resource_group, name).await?;
        Ok(Box::new(poller))
    }

    async fn delete_network_interface(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>> {
        let poller = self.begin_delete_network_interface(resource_group, name).await?;
        Ok(Box::new(poller))
    }

    async fn delete_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        name: &str,
    ) -> Result<BoxPoller<()>> {
        let poller = self.begin_delete_subnet(resource_group, vnet_name, name).await?;
        Ok(Box::new(poller))
    }

    async fn delete_virtual_network(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>> {
        let poller = self.begin_delete_virtual_network(resource_group, name).await?;
        Ok(Box::new(poller))
    }
}

/// Hands out one [`AzureClient`] per distinct set of credentials, so the
/// cached access token is reused across calls for the same subscription.
#[derive(Default)]
pub struct AzureClientFactory {
    clients: Mutex<HashMap<Credentials, Arc<AzureClient>>>,
}

impl AzureClientFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientFactory for AzureClientFactory {
    fn client(&self, credentials: &Credentials) -> Arc<dyn CloudApi> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let client = clients
            .entry(credentials.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    subscription_id = %credentials.subscription_id,
                    "azure: building management client"
                );
                Arc::new(AzureClient::from_client_secret(
                    credentials.tenant_id.clone(),
                    credentials.client_id.clone(),
                    credentials.client_secret.clone(),
                    credentials.subscription_id.clone(),
                ))
            })
            .clone();
        client
    }
}
