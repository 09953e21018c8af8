//! In-memory stand-ins for the cloud and overlay backends.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use azure_api::{
    BoxPoller, NetworkInterface, PollState, Poller, ResourceGroup, StatusCode, Subnet,
    VirtualMachine, VirtualNetwork,
};

use crate::cloud::{ClientFactory, CloudApi};
use crate::log_writer::LogSink;
use crate::options::{Credentials, TargetOptions};
use crate::tunnel::{BoxStream, OverlayConnector, OverlayNetwork, TunnelConfig};
use crate::types::{InitializeRequest, Target, TargetRequest};

/// Poller that reports `Pending` a fixed number of times before finishing.
pub struct ScriptedPoller<T> {
    pending: usize,
    retry_after: Option<Duration>,
    result: Option<Result<T, String>>,
}

impl<T> ScriptedPoller<T> {
    pub fn pending_then(pending: usize, result: Result<T, String>, retry_after: Option<Duration>) -> Self {
        Self {
            pending,
            retry_after,
            result: Some(result),
        }
    }
}

#[async_trait]
impl<T: Send> Poller<T> for ScriptedPoller<T> {
    async fn poll(&mut self) -> azure_api::Result<PollState<T>> {
        if self.pending > 0 {
            self.pending -= 1;
            return Ok(PollState::Pending {
                retry_after: self.retry_after,
            });
        }
        match self.result.take() {
            Some(Ok(value)) => Ok(PollState::Succeeded(value)),
            Some(Err(message)) => Ok(PollState::Failed(message)),
            None => Err(azure_api::Error::Operation("poller already finished".into())),
        }
    }
}

fn quick<T: Send + 'static>(value: T) -> BoxPoller<T> {
    Box::new(ScriptedPoller::pending_then(1, Ok(value), Some(Duration::ZERO)))
}

fn api_error(endpoint: &'static str, status: StatusCode) -> azure_api::Error {
    azure_api::Error::Api {
        endpoint,
        status,
        body: format!("{{\"error\":{{\"code\":\"{}\"}}}}", status.as_u16()),
    }
}

fn not_found(endpoint: &'static str) -> azure_api::Error {
    api_error(endpoint, StatusCode::NOT_FOUND)
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    failing: HashSet<&'static str>,
    resource_groups: HashMap<String, ResourceGroup>,
    vnets: HashMap<String, VirtualNetwork>,
    subnets: HashMap<(String, String), Subnet>,
    nics: HashMap<String, NetworkInterface>,
    vms: HashMap<String, VirtualMachine>,
    disks: HashSet<String>,
    power: HashMap<String, &'static str>,
}

/// Fake Azure subscription. Resources are keyed by name; resource groups
/// are not enforced beyond their own existence.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record a call and fail it with a 500 if `op` was marked failing.
    fn call(&self, op: &'static str, name: &str) -> azure_api::Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(format!("{op} {name}"));
        if state.failing.contains(op) {
            return Err(api_error(op, StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(state)
    }

    pub fn fail_on(&self, op: &'static str) {
        self.state().failing.insert(op);
    }

    pub fn add_resource_group(&self, name: &str, location: &str) {
        self.state().resource_groups.insert(
            name.to_string(),
            ResourceGroup {
                id: Some(format!("/subscriptions/fake/resourceGroups/{name}")),
                name: Some(name.to_string()),
                location: location.to_string(),
            },
        );
    }

    pub fn resource_group_location(&self, name: &str) -> Option<String> {
        self.state().resource_groups.get(name).map(|g| g.location.clone())
    }

    pub fn virtual_network(&self, name: &str) -> Option<VirtualNetwork> {
        self.state().vnets.get(name).cloned()
    }

    pub fn virtual_machine(&self, name: &str) -> Option<VirtualMachine> {
        self.state().vms.get(name).cloned()
    }

    pub fn power_state(&self, vm: &str) -> Option<String> {
        self.state().power.get(vm).map(|s| s.to_string())
    }

    /// Number of calls to `op`, failed ones included.
    pub fn count(&self, op: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    /// Mutating calls in order, as `"{op} {name}"`.
    pub fn mutations(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| !c.starts_with("get_"))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn resource_id(rg: &str, provider: &str, kind: &str, name: &str) -> String {
        format!("/subscriptions/fake/resourceGroups/{rg}/providers/{provider}/{kind}/{name}")
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn get_resource_group(&self, name: &str) -> azure_api::Result<ResourceGroup> {
        let state = self.call("get_resource_group", name)?;
        state
            .resource_groups
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("get resource group"))
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> azure_api::Result<ResourceGroup> {
        drop(self.call("create_resource_group", name)?);
        self.add_resource_group(name, location);
        Ok(self.state().resource_groups[name].clone())
    }

    async fn get_virtual_network(&self, _rg: &str, name: &str) -> azure_api::Result<VirtualNetwork> {
        let state = self.call("get_virtual_network", name)?;
        state.vnets.get(name).cloned().ok_or_else(|| not_found("get virtual network"))
    }

    async fn create_virtual_network(
        &self,
        rg: &str,
        name: &str,
        vnet: &VirtualNetwork,
    ) -> azure_api::Result<BoxPoller<VirtualNetwork>> {
        let mut state = self.call("create_virtual_network", name)?;
        let mut created = vnet.clone();
        created.id = Some(Self::resource_id(rg, "Microsoft.Network", "virtualNetworks", name));
        created.name = Some(name.to_string());
        state.vnets.insert(name.to_string(), created.clone());
        Ok(quick(created))
    }

    async fn get_subnet(&self, _rg: &str, vnet_name: &str, name: &str) -> azure_api::Result<Subnet> {
        let state = self.call("get_subnet", name)?;
        if !state.vnets.contains_key(vnet_name) {
            return Err(not_found("get subnet"));
        }
        state
            .subnets
            .get(&(vnet_name.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("get subnet"))
    }

    async fn create_subnet(
        &self,
        rg: &str,
        vnet_name: &str,
        name: &str,
        subnet: &Subnet,
    ) -> azure_api::Result<BoxPoller<Subnet>> {
        let mut state = self.call("create_subnet", name)?;
        if !state.vnets.contains_key(vnet_name) {
            return Err(not_found("create subnet"));
        }
        let mut created = subnet.clone();
        created.id = Some(format!(
            "{}/subnets/{name}",
            Self::resource_id(rg, "Microsoft.Network", "virtualNetworks", vnet_name)
        ));
        created.name = Some(name.to_string());
        state
            .subnets
            .insert((vnet_name.to_string(), name.to_string()), created.clone());
        Ok(quick(created))
    }

    async fn create_network_interface(
        &self,
        rg: &str,
        name: &str,
        nic: &NetworkInterface,
    ) -> azure_api::Result<BoxPoller<NetworkInterface>> {
        let mut state = self.call("create_network_interface", name)?;
        let mut created = nic.clone();
        created.id = Some(Self::resource_id(rg, "Microsoft.Network", "networkInterfaces", name));
        created.name = Some(name.to_string());
        state.nics.insert(name.to_string(), created.clone());
        Ok(quick(created))
    }

    async fn create_virtual_machine(
        &self,
        rg: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> azure_api::Result<BoxPoller<VirtualMachine>> {
        let mut state = self.call("create_virtual_machine", name)?;
        let mut created = vm.clone();
        created.id = Some(Self::resource_id(rg, "Microsoft.Compute", "virtualMachines", name));
        created.name = Some(name.to_string());
        if let Some(props) = created.properties.as_mut() {
            props.provisioning_state = Some("Succeeded".into());
            props.time_created = Some(chrono::Utc::now());
            if let Some(disk) = props
                .storage_profile
                .as_ref()
                .and_then(|s| s.os_disk.as_ref())
                .and_then(|d| d.name.clone())
            {
                state.disks.insert(disk);
            }
        }
        state.vms.insert(name.to_string(), created.clone());
        state.power.insert(name.to_string(), "running");
        Ok(quick(created))
    }

    async fn get_virtual_machine(&self, _rg: &str, name: &str) -> azure_api::Result<VirtualMachine> {
        let state = self.call("get_virtual_machine", name)?;
        state.vms.get(name).cloned().ok_or_else(|| not_found("get virtual machine"))
    }

    async fn start_virtual_machine(&self, _rg: &str, name: &str) -> azure_api::Result<BoxPoller<()>> {
        let mut state = self.call("start_virtual_machine", name)?;
        if !state.vms.contains_key(name) {
            return Err(not_found("start virtual machine"));
        }
        state.power.insert(name.to_string(), "running");
        Ok(quick(()))
    }

    async fn deallocate_virtual_machine(&self, _rg: &str, name: &str) -> azure_api::Result<BoxPoller<()>> {
        let mut state = self.call("deallocate_virtual_machine", name)?;
        if !state.vms.contains_key(name) {
            return Err(not_found("deallocate virtual machine"));
        }
        state.power.insert(name.to_string(), "deallocated");
        Ok(quick(()))
    }

    async fn delete_virtual_machine(&self, _rg: &str, name: &str) -> azure_api::Result<BoxPoller<()>> {
        let mut state = self.call("delete_virtual_machine", name)?;
        state.power.remove(name);
        match state.vms.remove(name) {
            Some(_) => Ok(quick(())),
            None => Err(not_found("delete virtual machine")),
        }
    }

    async fn delete_disk(&self, _rg: &str, name: &str) -> azure_api::Result<BoxPoller<()>> {
        let mut state = self.call("delete_disk", name)?;
        if state.disks.remove(name) {
            Ok(quick(()))
        } else {
            Err(not_found("delete disk"))
        }
    }

    async fn delete_network_interface(&self, _rg: &str, name: &str) -> azure_api::Result<BoxPoller<()>> {
        let mut state = self.call("delete_network_interface", name)?;
        match state.nics.remove(name) {
            Some(_) => Ok(quick(())),
            None => Err(not_found("delete network interface")),
        }
    }

    async fn delete_subnet(&self, _rg: &str, vnet_name: &str, name: &str) -> azure_api::Result<BoxPoller<()>> {
        let mut state = self.call("delete_subnet", name)?;
        match state.subnets.remove(&(vnet_name.to_string(), name.to_string())) {
            Some(_) => Ok(quick(())),
            None => Err(not_found("delete subnet")),
        }
    }

    async fn delete_virtual_network(&self, _rg: &str, name: &str) -> azure_api::Result<BoxPoller<()>> {
        let mut state = self.call("delete_virtual_network", name)?;
        match state.vnets.remove(name) {
            Some(_) => Ok(quick(())),
            None => Err(not_found("delete virtual network")),
        }
    }
}

/// Hands out the same [`FakeCloud`] for every credential set.
pub struct FakeFactory {
    cloud: Arc<FakeCloud>,
}

impl FakeFactory {
    pub fn new(cloud: Arc<FakeCloud>) -> Self {
        Self { cloud }
    }
}

impl ClientFactory for FakeFactory {
    fn client(&self, _credentials: &Credentials) -> Arc<dyn CloudApi> {
        self.cloud.clone()
    }
}

#[derive(Debug, Clone, Copy)]
enum Reachability {
    After(usize),
    Never,
    RefuseAfter(Duration),
    Hang,
}

/// Overlay whose peers start answering after a number of refused dials.
pub struct FakeOverlay {
    reachability: Reachability,
    dials: AtomicUsize,
    last_address: Mutex<Option<String>>,
}

impl FakeOverlay {
    fn with(reachability: Reachability) -> Self {
        Self {
            reachability,
            dials: AtomicUsize::new(0),
            last_address: Mutex::new(None),
        }
    }

    pub fn reachable_after(failed_dials: usize) -> Self {
        Self::with(Reachability::After(failed_dials))
    }

    pub fn unreachable() -> Self {
        Self::with(Reachability::Never)
    }

    /// Every dial is refused, but only after `delay`.
    pub fn refusing_after(delay: Duration) -> Self {
        Self::with(Reachability::RefuseAfter(delay))
    }

    /// Dials never complete.
    pub fn hanging() -> Self {
        Self::with(Reachability::Hang)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn last_address(&self) -> Option<String> {
        self.last_address.lock().unwrap().clone()
    }
}

#[async_trait]
impl OverlayNetwork for FakeOverlay {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxStream> {
        let previous = self.dials.fetch_add(1, Ordering::SeqCst);
        *self.last_address.lock().unwrap() = Some(format!("{host}:{port}"));

        match self.reachability {
            Reachability::After(n) if previous >= n => {
                let (stream, _peer) = tokio::io::duplex(64);
                Ok(Box::new(stream))
            }
            Reachability::Hang => std::future::pending::<io::Result<BoxStream>>().await,
            Reachability::RefuseAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
            }
            _ => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")),
        }
    }
}

/// Connector that counts joins and always yields the same [`FakeOverlay`].
pub struct FakeConnector {
    overlay: Arc<FakeOverlay>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn reachable_after(failed_dials: usize) -> Self {
        Self::over(FakeOverlay::reachable_after(failed_dials))
    }

    pub fn unreachable() -> Self {
        Self::over(FakeOverlay::unreachable())
    }

    fn over(overlay: FakeOverlay) -> Self {
        Self {
            overlay: Arc::new(overlay),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn overlay(&self) -> Arc<FakeOverlay> {
        self.overlay.clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OverlayConnector for FakeConnector {
    async fn connect(&self, _config: &TunnelConfig) -> io::Result<Arc<dyn OverlayNetwork>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.overlay.clone())
    }
}

/// Sink that keeps every write as a separate string.
#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl LogSink for MemorySink {
    fn write(&self, bytes: &[u8]) {
        self.writes
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(bytes).into_owned());
    }
}

pub const TEST_CREDENTIALS: [(&str, &str); 4] = [
    ("Tenant Id", "tenant"),
    ("Client Id", "client"),
    ("Client Secret", "secret"),
    ("Subscription Id", "subscription"),
];

/// Options with test credentials and every default applied.
pub fn options() -> TargetOptions {
    TargetOptions::parse_with_env(&options_json("{}"), |_| None).unwrap()
}

/// Add the test credentials to a JSON options object. Anything that is not
/// a JSON object is returned unchanged.
pub fn options_json(json: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(serde_json::Value::Object(mut map)) => {
            for (key, value) in TEST_CREDENTIALS {
                map.entry(key).or_insert_with(|| value.into());
            }
            serde_json::Value::Object(map).to_string()
        }
        _ => json.to_string(),
    }
}

pub fn target_request(id: &str, options: &str) -> TargetRequest {
    TargetRequest {
        target: Target {
            id: id.to_string(),
            name: format!("target {id}"),
            env_vars: HashMap::from([("DAYTONA_TARGET_ID".to_string(), id.to_string())]),
            api_key: "target-api-key".to_string(),
            options: options_json(options),
        },
    }
}

pub fn initialize_request(target_logs_dir: Option<&Path>) -> InitializeRequest {
    InitializeRequest {
        base_path: std::env::temp_dir().join("azure-provider-test").display().to_string(),
        daytona_download_url: "https://server.test/download".into(),
        daytona_version: "0.0.0-test".into(),
        server_url: "https://server.test".into(),
        network_key: "network-key".into(),
        api_url: "https://api.test".into(),
        api_key: None,
        api_port: 3986,
        server_port: 3987,
        target_logs_dir: target_logs_dir.map(|p| p.display().to_string()),
    }
}
