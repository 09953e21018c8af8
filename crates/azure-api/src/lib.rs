//! Typed Rust client for the Azure Resource Manager REST API.
//!
//! Covers the subset needed to run a single-NIC Linux VM:
//! resource groups, virtual networks, subnets, network interfaces,
//! virtual machines (create, get, start, deallocate, delete) and disks
//! (delete). Mutating calls return an [`ArmPoller`] that drives the
//! platform's long-running operation protocol.

mod auth;
mod poller;
mod types;

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use auth::ClientSecretCredential;
pub use poller::{ArmPoller, BoxPoller, PollState, Poller};
pub use reqwest::StatusCode;
pub use types::*;

const MANAGEMENT_URL: &str = "https://management.azure.com";

const RESOURCES_API_VERSION: &str = "2021-04-01";
const NETWORK_API_VERSION: &str = "2023-09-01";
const COMPUTE_API_VERSION: &str = "2024-03-01";
const DISKS_API_VERSION: &str = "2023-10-02";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("azure request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("azure authentication failed ({status}): {body}")]
    Auth { status: StatusCode, body: String },

    #[error("azure api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("azure api {endpoint} returned an unexpected body: {source}")]
    Decode {
        endpoint: &'static str,
        source: serde_json::Error,
    },

    #[error("azure operation error: {0}")]
    Operation(String),
}

impl Error {
    /// True when the platform reported that the addressed resource (or its
    /// parent) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for one Azure subscription.
#[derive(Clone)]
pub struct AzureClient {
    credential: Arc<ClientSecretCredential>,
    subscription_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl AzureClient {
    /// Build a client authenticating as a service principal.
    pub fn from_client_secret(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::new();
        let credential = ClientSecretCredential::new(tenant_id, client_id, client_secret, http.clone());
        Self {
            credential: Arc::new(credential),
            subscription_id: subscription_id.into(),
            base_url: MANAGEMENT_URL.into(),
            http,
        }
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!(
            "{}/subscriptions/{}{path}?api-version={api_version}",
            self.base_url, self.subscription_id
        )
    }

    fn group_path(resource_group: &str) -> String {
        format!("/resourcegroups/{resource_group}")
    }

    fn network_path(resource_group: &str, kind: &str, name: &str) -> String {
        format!("/resourceGroups/{resource_group}/providers/Microsoft.Network/{kind}/{name}")
    }

    fn compute_path(resource_group: &str, kind: &str, name: &str) -> String {
        format!("/resourceGroups/{resource_group}/providers/Microsoft.Compute/{kind}/{name}")
    }

    fn subnet_path(resource_group: &str, vnet_name: &str, subnet_name: &str) -> String {
        format!(
            "{}/subnets/{subnet_name}",
            Self::network_path(resource_group, "virtualNetworks", vnet_name)
        )
    }

    async fn request(&self, method: Method, url: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.credential.token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    /// Like `check` but also treats 404 as success (for delete idempotency).
    async fn check_allow_404(
        resp: reqwest::Response,
        endpoint: &'static str,
    ) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    pub(crate) async fn get_raw(&self, url: &str, endpoint: &'static str) -> Result<reqwest::Response> {
        let resp = self.request(Method::GET, url).await?.send().await?;
        Self::check(resp, endpoint).await
    }

    pub(crate) async fn get_value(&self, url: &str, endpoint: &'static str) -> Result<serde_json::Value> {
        self.get_json(url, endpoint).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, endpoint: &'static str) -> Result<T> {
        self.get_raw(url, endpoint)
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    async fn begin_put<B, T>(&self, url: String, endpoint: &'static str, body: &B) -> Result<ArmPoller<T>>
    where
        B: Serialize + ?Sized,
    {
        let resp = self.request(Method::PUT, &url).await?.json(body).send().await?;
        let resp = Self::check(resp, endpoint).await?;
        ArmPoller::from_response(self.clone(), endpoint, Some(url), resp).await
    }

    async fn begin_action(&self, url: String, endpoint: &'static str) -> Result<ArmPoller<()>> {
        let resp = self
            .request(Method::POST, &url)
            .await?
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;
        let resp = Self::check(resp, endpoint).await?;
        ArmPoller::from_response(self.clone(), endpoint, None, resp).await
    }

    async fn begin_delete(&self, url: String, endpoint: &'static str) -> Result<ArmPoller<()>> {
        let resp = self.request(Method::DELETE, &url).await?.send().await?;
        let resp = Self::check_allow_404(resp, endpoint).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!(endpoint, "azure: resource already absent");
        }
        ArmPoller::from_response(self.clone(), endpoint, None, resp).await
    }

    // ── Resource groups ──────────────────────────────────────────────

    pub async fn get_resource_group(&self, name: &str) -> Result<ResourceGroup> {
        let url = self.url(&Self::group_path(name), RESOURCES_API_VERSION);
        self.get_json(&url, "get resource group").await
    }

    /// Create or update a resource group. This call completes synchronously.
    pub async fn create_resource_group(&self, name: &str, group: &ResourceGroup) -> Result<ResourceGroup> {
        let url = self.url(&Self::group_path(name), RESOURCES_API_VERSION);
        let resp = self
            .request(Method::PUT, &url)
            .await?
            .json(group)
            .send()
            .await?;

        Self::check(resp, "create resource group")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Network ──────────────────────────────────────────────────────

    pub async fn get_virtual_network(&self, resource_group: &str, name: &str) -> Result<VirtualNetwork> {
        let url = self.url(
            &Self::network_path(resource_group, "virtualNetworks", name),
            NETWORK_API_VERSION,
        );
        self.get_json(&url, "get virtual network").await
    }

    pub async fn begin_create_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> Result<ArmPoller<VirtualNetwork>> {
        let url = self.url(
            &Self::network_path(resource_group, "virtualNetworks", name),
            NETWORK_API_VERSION,
        );
        self.begin_put(url, "create virtual network", vnet).await
    }

    pub async fn begin_delete_virtual_network(&self, resource_group: &str, name: &str) -> Result<ArmPoller<()>> {
        let url = self.url(
            &Self::network_path(resource_group, "virtualNetworks", name),
            NETWORK_API_VERSION,
        );
        self.begin_delete(url, "delete virtual network").await
    }

    pub async fn get_subnet(&self, resource_group: &str, vnet_name: &str, name: &str) -> Result<Subnet> {
        let url = self.url(&Self::subnet_path(resource_group, vnet_name, name), NETWORK_API_VERSION);
        self.get_json(&url, "get subnet").await
    }

    pub async fn begin_create_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        name: &str,
        subnet: &Subnet,
    ) -> Result<ArmPoller<Subnet>> {
        let url = self.url(&Self::subnet_path(resource_group, vnet_name, name), NETWORK_API_VERSION);
        self.begin_put(url, "create subnet", subnet).await
    }

    pub async fn begin_delete_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        name: &str,
    ) -> Result<ArmPoller<()>> {
        let url = self.url(&Self::subnet_path(resource_group, vnet_name, name), NETWORK_API_VERSION);
        self.begin_delete(url, "delete subnet").await
    }

    pub async fn begin_create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<ArmPoller<NetworkInterface>> {
        let url = self.url(
            &Self::network_path(resource_group, "networkInterfaces", name),
            NETWORK_API_VERSION,
        );
        self.begin_put(url, "create network interface", nic).await
    }

    pub async fn begin_delete_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<ArmPoller<()>> {
        let url = self.url(
            &Self::network_path(resource_group, "networkInterfaces", name),
            NETWORK_API_VERSION,
        );
        self.begin_delete(url, "delete network interface").await
    }

    // ── Compute ──────────────────────────────────────────────────────

    pub async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        let url = self.url(
            &Self::compute_path(resource_group, "virtualMachines", name),
            COMPUTE_API_VERSION,
        );
        self.get_json(&url, "get virtual machine").await
    }

    pub async fn begin_create_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<ArmPoller<VirtualMachine>> {
        let url = self.url(
            &Self::compute_path(resource_group, "virtualMachines", name),
            COMPUTE_API_VERSION,
        );
        self.begin_put(url, "create virtual machine", vm).await
    }

    pub async fn begin_start_virtual_machine(&self, resource_group: &str, name: &str) -> Result<ArmPoller<()>> {
        let path = Self::compute_path(resource_group, "virtualMachines", name);
        let url = self.url(&format!("{path}/start"), COMPUTE_API_VERSION);
        self.begin_action(url, "start virtual machine").await
    }

    /// Stop the VM and release its compute allocation.
    pub async fn begin_deallocate_virtual_machine(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<ArmPoller<()>> {
        let path = Self::compute_path(resource_group, "virtualMachines", name);
        let url = self.url(&format!("{path}/deallocate"), COMPUTE_API_VERSION);
        self.begin_action(url, "deallocate virtual machine").await
    }

    pub async fn begin_delete_virtual_machine(&self, resource_group: &str, name: &str) -> Result<ArmPoller<()>> {
        let url = self.url(
            &Self::compute_path(resource_group, "virtualMachines", name),
            COMPUTE_API_VERSION,
        );
        self.begin_delete(url, "delete virtual machine").await
    }

    pub async fn begin_delete_disk(&self, resource_group: &str, name: &str) -> Result<ArmPoller<()>> {
        let url = self.url(&Self::compute_path(resource_group, "disks", name), DISKS_API_VERSION);
        self.begin_delete(url, "delete disk").await
    }
}
