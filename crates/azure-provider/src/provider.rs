use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{info, warn};

use crate::azure::AzureClientFactory;
use crate::bootstrap::{bootstrap_script, encode_custom_data, init_script};
use crate::cloud::{ClientFactory, CloudApi};
use crate::config::ProviderConfig;
use crate::log_writer::TargetLogWriter;
use crate::lro::complete;
use crate::manifest::{TargetManifest, target_manifest};
use crate::metadata::TargetMetadata;
use crate::naming::{ResourceNames, validate_target_id};
use crate::options::TargetOptions;
use crate::provision::{MachineSpec, Provisioner};
use crate::reachability::wait_for_dial;
use crate::resource_group::{resolve_resource_group, resource_group_name};
use crate::spinner::Spinner;
use crate::teardown::teardown;
use crate::tunnel::{HostNetworkConnector, OverlayConnector, Tunnel, TunnelConfig};
use crate::types::{InitializeRequest, ProviderInfo, RequirementStatus, Target, TargetConfig, TargetRequest};
use crate::{Error, Result, Step};

pub const PROVIDER_NAME: &str = "azure-provider";
pub const PROVIDER_LABEL: &str = "Azure";

#[derive(Debug, Clone)]
struct Settings {
    download_url: String,
    tunnel: TunnelConfig,
    target_logs_dir: Option<PathBuf>,
}

/// Provisions targets as Azure VMs and waits for their agents to come up.
///
/// One instance serves many targets. Operations on the same target id are
/// serialized; different targets proceed independently.
pub struct AzureProvider {
    config: ProviderConfig,
    clients: Arc<dyn ClientFactory>,
    tunnel: Tunnel,
    settings: RwLock<Option<Settings>>,
    target_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AzureProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(AzureClientFactory::new()),
            Arc::new(HostNetworkConnector),
        )
    }

    pub fn with_backends(
        config: ProviderConfig,
        clients: Arc<dyn ClientFactory>,
        connector: Arc<dyn OverlayConnector>,
    ) -> Self {
        Self {
            config,
            clients,
            tunnel: Tunnel::new(connector),
            settings: RwLock::new(None),
            target_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub async fn initialize(&self, req: InitializeRequest) -> Result<()> {
        let settings = Settings {
            download_url: req.daytona_download_url,
            tunnel: TunnelConfig::new(req.network_key, req.server_url, &PathBuf::from(req.base_path)),
            target_logs_dir: req
                .target_logs_dir
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
        };
        info!(version = %req.daytona_version, "provider initialized");
        *self.settings.write().await = Some(settings);
        Ok(())
    }

    pub fn get_info(&self) -> ProviderInfo {
        ProviderInfo {
            name: PROVIDER_NAME.to_string(),
            label: Some(PROVIDER_LABEL.to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            target_config_manifest: target_manifest(),
        }
    }

    pub fn get_target_manifest(&self) -> TargetManifest {
        target_manifest()
    }

    pub fn get_preset_target_configs(&self) -> Vec<TargetConfig> {
        Vec::new()
    }

    pub fn check_requirements(&self) -> Vec<RequirementStatus> {
        Vec::new()
    }

    /// Provision the target's resources, then block until its agent answers
    /// on the control port. A failure leaves created resources in place for
    /// a later [`AzureProvider::destroy_target`].
    pub async fn create_target(&self, req: &TargetRequest) -> Result<()> {
        let target = &req.target;
        validate_target_id(&target.id)?;
        let _guard = self.lock_target(&target.id).await;
        let settings = self.settings().await;
        let log = self.log_writer(target, settings.as_ref());

        let Some(settings) = settings else {
            return logged(&log, "Failed to create target: ", Err(Error::NotInitialized));
        };
        let options = logged(&log, "Failed to parse target options: ", TargetOptions::parse(&target.options))?;

        logged(
            &log,
            "Failed to create target: ",
            self.provision(target, &options, &settings).await,
        )?;
        info!(target_id = %target.id, "target resources created");

        logged(
            &log,
            "Failed to dial: ",
            self.wait_for_agent(target, &settings, log.clone()).await,
        )
    }

    pub async fn start_target(&self, req: &TargetRequest) -> Result<()> {
        let target = &req.target;
        validate_target_id(&target.id)?;
        let _guard = self.lock_target(&target.id).await;
        let settings = self.settings().await;
        let log = self.log_writer(target, settings.as_ref());

        let Some(settings) = settings else {
            return logged(&log, "Failed to start target: ", Err(Error::NotInitialized));
        };
        let options = logged(&log, "Failed to parse target options: ", TargetOptions::parse(&target.options))?;

        let api = self.clients.client(&options.credentials());
        let names = ResourceNames::for_target(&target.id);
        let begin = api
            .start_virtual_machine(resource_group_name(&options), &names.vm)
            .await;
        logged(
            &log,
            "Failed to start target: ",
            complete(Step::StartVirtualMachine, begin, &self.config.lro).await,
        )?;
        info!(target_id = %target.id, "virtual machine started");

        logged(
            &log,
            "Failed to dial: ",
            self.wait_for_agent(target, &settings, log.clone()).await,
        )
    }

    /// Deallocate the target's VM. Disks and network stay in place.
    pub async fn stop_target(&self, req: &TargetRequest) -> Result<()> {
        let target = &req.target;
        validate_target_id(&target.id)?;
        let _guard = self.lock_target(&target.id).await;
        let log = self.log_writer(target, self.settings().await.as_ref());
        let options = logged(&log, "Failed to parse target options: ", TargetOptions::parse(&target.options))?;

        let api = self.clients.client(&options.credentials());
        let names = ResourceNames::for_target(&target.id);
        let begin = api
            .deallocate_virtual_machine(resource_group_name(&options), &names.vm)
            .await;
        logged(
            &log,
            "Failed to stop target: ",
            complete(Step::StopVirtualMachine, begin, &self.config.lro).await,
        )?;
        info!(target_id = %target.id, "virtual machine deallocated");
        Ok(())
    }

    pub async fn destroy_target(&self, req: &TargetRequest) -> Result<()> {
        let target = &req.target;
        validate_target_id(&target.id)?;
        let _guard = self.lock_target(&target.id).await;
        let log = self.log_writer(target, self.settings().await.as_ref());
        let options = logged(&log, "Failed to parse target options: ", TargetOptions::parse(&target.options))?;

        let api = self.clients.client(&options.credentials());
        let names = ResourceNames::for_target(&target.id);
        logged(
            &log,
            "Failed to destroy target: ",
            teardown(api.as_ref(), &self.config.lro, resource_group_name(&options), &names).await,
        )?;
        info!(target_id = %target.id, "target destroyed");
        Ok(())
    }

    /// Describe the target's live VM as a JSON document.
    pub async fn get_target_metadata(&self, req: &TargetRequest) -> Result<String> {
        let target = &req.target;
        validate_target_id(&target.id)?;
        let log = self.log_writer(target, self.settings().await.as_ref());
        let options = logged(&log, "Failed to parse target options: ", TargetOptions::parse(&target.options))?;

        let api = self.clients.client(&options.credentials());
        let names = ResourceNames::for_target(&target.id);
        let vm = logged(
            &log,
            "Failed to get machine: ",
            api.get_virtual_machine(resource_group_name(&options), &names.vm)
                .await
                .map_err(Error::remote(Step::GetVirtualMachine)),
        )?;

        serde_json::to_string(&TargetMetadata::from(&vm)).map_err(Error::Metadata)
    }

    async fn provision(&self, target: &Target, options: &TargetOptions, settings: &Settings) -> Result<()> {
        let script = bootstrap_script(
            &target.env_vars,
            &init_script(&target.api_key, &settings.download_url),
        );
        let spec = MachineSpec::new(options, encode_custom_data(&script))?;

        let api: Arc<dyn CloudApi> = self.clients.client(&options.credentials());
        let resource_group = resolve_resource_group(api.as_ref(), options).await?;

        Provisioner::new(
            api,
            self.config.lro,
            resource_group,
            options.region.clone(),
            ResourceNames::for_target(&target.id),
        )
        .run(&spec)
        .await?;
        Ok(())
    }

    async fn wait_for_agent(&self, target: &Target, settings: &Settings, log: Arc<TargetLogWriter>) -> Result<()> {
        let network = self
            .tunnel
            .get(&settings.tunnel)
            .await
            .map_err(|e| Error::Tunnel(e.to_string()))?;

        let spinner = Spinner::start(
            log,
            "Waiting for the agent to start",
            "Agent started",
            self.config.spinner_interval,
        );
        let result = wait_for_dial(network.as_ref(), &target.id, &self.config.reachability).await;
        spinner.stop().await;
        result
    }

    async fn settings(&self) -> Option<Settings> {
        self.settings.read().await.clone()
    }

    async fn lock_target(&self, target_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.target_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(target_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn log_writer(&self, target: &Target, settings: Option<&Settings>) -> Arc<TargetLogWriter> {
        let dir = settings.and_then(|s| s.target_logs_dir.as_deref());
        let writer = TargetLogWriter::new(&target.id, dir).unwrap_or_else(|e| {
            warn!(target_id = %target.id, error = %e, "cannot open target log file, logging to tracing only");
            TargetLogWriter::tracing_only(&target.id)
        });
        Arc::new(writer)
    }
}

fn logged<T>(log: &TargetLogWriter, prefix: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        log.line(&format!("{prefix}{e}"));
    }
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::log_writer::log_path;
    use crate::testing::{FakeCloud, FakeConnector, FakeFactory, initialize_request, target_request};

    struct Harness {
        provider: Arc<AzureProvider>,
        cloud: Arc<FakeCloud>,
        connector: Arc<FakeConnector>,
    }

    fn harness(connector: FakeConnector) -> Harness {
        let cloud = Arc::new(FakeCloud::new());
        let connector = Arc::new(connector);
        let provider = AzureProvider::with_backends(
            ProviderConfig::default(),
            Arc::new(FakeFactory::new(cloud.clone())),
            connector.clone(),
        );
        Harness {
            provider: Arc::new(provider),
            cloud,
            connector,
        }
    }

    async fn initialized(connector: FakeConnector, logs: Option<&std::path::Path>) -> Harness {
        let h = harness(connector);
        h.provider.initialize(initialize_request(logs)).await.unwrap();
        h
    }

    #[tokio::test(start_paused = true)]
    async fn create_then_metadata_reports_vm() {
        let h = initialized(FakeConnector::reachable_after(2), None).await;
        let req = target_request("t1", "{}");

        h.provider.create_target(&req).await.unwrap();
        let json = h.provider.get_target_metadata(&req).await.unwrap();

        let metadata: TargetMetadata = serde_json::from_str(&json).unwrap();
        assert!(!metadata.vm_id.is_empty());
        assert_eq!(metadata.vm_name, "daytona-t1");
        assert_eq!(metadata.vm_size_type, "Standard_B2s");
        assert_eq!(metadata.location, "centralus");
        assert_eq!(h.connector.connects(), 1);
        assert_eq!(h.connector.overlay().dials(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_then_metadata_is_not_found() {
        let h = initialized(FakeConnector::reachable_after(0), None).await;
        let req = target_request("t1", "{}");

        h.provider.create_target(&req).await.unwrap();
        h.provider.destroy_target(&req).await.unwrap();
        let err = h.provider.get_target_metadata(&req).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(h.cloud.virtual_network("daytona-vnet-t1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_image_urn_makes_no_remote_calls() {
        let h = initialized(FakeConnector::reachable_after(0), None).await;
        let req = target_request("t1", r#"{"Image URN": "bad:urn"}"#);

        let err = h.provider.create_target(&req).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(h.cloud.total_calls(), 0);
        assert_eq!(h.connector.connects(), 0);
    }

    #[tokio::test]
    async fn create_requires_initialize() {
        let h = harness(FakeConnector::reachable_after(0));

        let err = h.provider.create_target(&target_request("t1", "{}")).await.unwrap_err();

        assert!(matches!(err, Error::NotInitialized));
        assert_eq!(h.cloud.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_agent_times_out_and_is_logged() {
        let logs = tempfile::tempdir().unwrap();
        let h = initialized(FakeConnector::unreachable(), Some(logs.path())).await;

        let err = h.provider.create_target(&target_request("t1", "{}")).await.unwrap_err();

        assert!(err.is_timeout());
        let log = std::fs::read_to_string(log_path(logs.path(), "t1")).unwrap();
        assert!(log.contains("⠋ Waiting for the agent to start\r"));
        assert!(log.contains("Agent started\n"));
        assert!(log.ends_with("Failed to dial: timeout: dialing timed out after 10.0 minutes\n"));
        // resources stay for an explicit destroy
        assert!(h.cloud.virtual_machine("daytona-t1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_options_are_logged_with_prefix() {
        let logs = tempfile::tempdir().unwrap();
        let h = initialized(FakeConnector::reachable_after(0), Some(logs.path())).await;

        h.provider.destroy_target(&target_request("t9", "not json")).await.unwrap_err();

        let log = std::fs::read_to_string(log_path(logs.path(), "t9")).unwrap();
        assert!(log.starts_with("Failed to parse target options: "));
    }

    #[tokio::test]
    async fn unsafe_target_ids_touch_neither_disk_nor_cloud() {
        let root = tempfile::tempdir().unwrap();
        let logs = root.path().join("logs");
        let h = initialized(FakeConnector::reachable_after(0), Some(&logs)).await;

        for id in ["../escaped", "a/b", "a?api-version=x"] {
            let req = target_request(id, "{}");
            assert!(matches!(h.provider.destroy_target(&req).await, Err(Error::InvalidTargetId(_))));
            assert!(matches!(h.provider.create_target(&req).await, Err(Error::InvalidTargetId(_))));
            assert!(h.provider.get_target_metadata(&req).await.unwrap_err().is_validation());
        }

        assert!(!root.path().join("escaped.log").exists());
        assert_eq!(h.cloud.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_deallocates_and_start_waits_for_agent() {
        let h = initialized(FakeConnector::reachable_after(0), None).await;
        let req = target_request("t1", "{}");
        h.provider.create_target(&req).await.unwrap();

        h.provider.stop_target(&req).await.unwrap();
        assert_eq!(h.cloud.power_state("daytona-t1").as_deref(), Some("deallocated"));

        h.provider.start_target(&req).await.unwrap();
        assert_eq!(h.cloud.power_state("daytona-t1").as_deref(), Some("running"));
        assert_eq!(h.connector.overlay().dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_is_reported() {
        let logs = tempfile::tempdir().unwrap();
        let h = initialized(FakeConnector::reachable_after(0), Some(logs.path())).await;

        let err = h.provider.start_target(&target_request("ghost", "{}")).await.unwrap_err();

        assert!(err.is_not_found());
        let log = std::fs::read_to_string(log_path(logs.path(), "ghost")).unwrap();
        assert!(log.starts_with("Failed to start target: cannot start virtual machine"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_creates_of_one_target_are_serialized() {
        let h = initialized(FakeConnector::reachable_after(0), None).await;
        let req = target_request("t1", "{}");

        let a = {
            let provider = h.provider.clone();
            let req = req.clone();
            tokio::spawn(async move { provider.create_target(&req).await })
        };
        let b = {
            let provider = h.provider.clone();
            let req = req.clone();
            tokio::spawn(async move { provider.create_target(&req).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(h.cloud.count("create_virtual_network"), 1);
        assert_eq!(h.cloud.count("create_resource_group"), 1);
    }

    #[test]
    fn info_and_static_catalogues() {
        let h = harness(FakeConnector::reachable_after(0));
        let info = h.provider.get_info();

        assert_eq!(info.name, "azure-provider");
        assert_eq!(info.label.as_deref(), Some("Azure"));
        assert_eq!(info.target_config_manifest.len(), 10);
        assert!(h.provider.get_preset_target_configs().is_empty());
        assert!(h.provider.check_requirements().is_empty());
        assert_eq!(h.provider.config().reachability.timeout, Duration::from_secs(600));
    }
}
