use std::sync::Arc;

use async_trait::async_trait;
use azure_api::{
    BoxPoller, NetworkInterface, ResourceGroup, Result, Subnet, VirtualMachine, VirtualNetwork,
};

use crate::options::Credentials;

/// The Azure Resource Manager operations the provisioning engine depends on.
///
/// [`azure_api::AzureClient`] is the production implementation. Mutating
/// calls hand back a poller that [`crate::lro::await_operation`] drives to
/// completion.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup>;

    /// Create a resource group. Completes synchronously.
    async fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup>;

    async fn get_virtual_network(&self, resource_group: &str, name: &str) -> Result<VirtualNetwork>;

    async fn create_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> Result<BoxPoller<VirtualNetwork>>;

    async fn get_subnet(&self, resource_group: &str, vnet_name: &str, name: &str) -> Result<Subnet>;

    async fn create_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        name: &str,
        subnet: &Subnet,
    ) -> Result<BoxPoller<Subnet>>;

    async fn create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<BoxPoller<NetworkInterface>>;

    async fn create_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<BoxPoller<VirtualMachine>>;

    async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine>;

    async fn start_virtual_machine(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>>;

    async fn deallocate_virtual_machine(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>>;

    async fn delete_virtual_machine(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>>;

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>>;

    async fn delete_network_interface(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>>;

    async fn delete_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        name: &str,
    ) -> Result<BoxPoller<()>>;

    async fn delete_virtual_network(&self, resource_group: &str, name: &str) -> Result<BoxPoller<()>>;
}

/// Builds a [`CloudApi`] for one set of service-principal credentials.
pub trait ClientFactory: Send + Sync {
    fn client(&self, credentials: &Credentials) -> Arc<dyn CloudApi>;
}
