//! Ordered creation of a target's network and compute resources.
//!
//! Each step consumes the resource produced by the one before it, so the
//! dependency order (vnet, subnet, NIC, VM) is enforced by the types.

use std::sync::Arc;

use azure_api::{
    AddressSpace, HardwareProfile, ImageReference, IpConfiguration, IpConfigurationProperties,
    ManagedDisk, NetworkInterface, NetworkInterfaceProperties, NetworkProfile, OsDisk, OsProfile,
    StorageProfile, SubResource, Subnet, SubnetProperties, VirtualMachine, VirtualMachineIdentity,
    VirtualMachineProperties, VirtualNetwork, VirtualNetworkProperties,
};
use rand::seq::{IndexedRandom, SliceRandom};
use tracing::info;

use crate::cloud::CloudApi;
use crate::lro::{LroConfig, complete};
use crate::naming::ResourceNames;
use crate::options::TargetOptions;
use crate::{Error, Result, Step};

pub const VNET_ADDRESS_SPACE: &str = "10.10.0.0/16";
pub const SUBNET_ADDRESS_PREFIX: &str = "10.10.10.0/24";
pub const IP_CONFIGURATION_NAME: &str = "ipConfig";
pub const ADMIN_USERNAME: &str = "daytona";

const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"~!@#$%^&*()_+-={}[]:<>?,.";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Split a `publisher:offer:sku:version` image URN.
pub fn parse_image_urn(urn: &str) -> Result<ImageReference> {
    let parts: Vec<&str> = urn.split(':').collect();
    match parts.as_slice() {
        [publisher, offer, sku, version] if parts.iter().all(|p| !p.is_empty()) => {
            Ok(ImageReference {
                publisher: publisher.to_string(),
                offer: offer.to_string(),
                sku: sku.to_string(),
                version: version.to_string(),
            })
        }
        _ => Err(Error::InvalidImageUrn(urn.to_string())),
    }
}

/// A 12 character admin password: 3 digits, 3 symbols, 3 lower and 3 upper
/// case letters, no character repeated.
pub fn generate_password() -> String {
    let mut rng = rand::rng();
    let mut chars: Vec<u8> = Vec::with_capacity(12);
    for class in [DIGITS, SYMBOLS, LOWER, UPPER] {
        chars.extend(class.choose_multiple(&mut rng, 3).copied());
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

/// Everything about the VM that is decided before talking to the platform.
#[derive(Debug, Clone)]
pub struct MachineSpec {
    pub image: ImageReference,
    pub vm_size: String,
    pub disk_type: String,
    pub disk_size_gb: i32,
    pub admin_password: String,
    pub custom_data: String,
}

impl MachineSpec {
    /// Fails on a malformed image URN, before any remote call is made.
    pub fn new(options: &TargetOptions, custom_data: String) -> Result<Self> {
        Ok(Self {
            image: parse_image_urn(&options.image_urn)?,
            vm_size: options.vm_size.clone(),
            disk_type: options.disk_type.clone(),
            disk_size_gb: options.disk_size,
            admin_password: generate_password(),
            custom_data,
        })
    }
}

pub struct Provisioner {
    api: Arc<dyn CloudApi>,
    lro: LroConfig,
    resource_group: String,
    region: String,
    names: ResourceNames,
}

impl Provisioner {
    pub fn new(
        api: Arc<dyn CloudApi>,
        lro: LroConfig,
        resource_group: impl Into<String>,
        region: impl Into<String>,
        names: ResourceNames,
    ) -> Self {
        Self {
            api,
            lro,
            resource_group: resource_group.into(),
            region: region.into(),
            names,
        }
    }

    /// Create (or reuse) every resource of the target in dependency order.
    /// Stops at the first failure and leaves earlier resources in place.
    pub async fn run(&self, spec: &MachineSpec) -> Result<VirtualMachine> {
        let vnet = self.virtual_network().await?;
        let subnet = self.subnet(&vnet).await?;
        let nic = self.network_interface(&subnet).await?;
        self.virtual_machine(&nic, spec).await
    }

    pub async fn virtual_network(&self) -> Result<VirtualNetwork> {
        let step = Step::CreateVirtualNetwork;
        match self
            .api
            .get_virtual_network(&self.resource_group, &self.names.vnet)
            .await
        {
            Ok(existing) => {
                info!(vnet = %self.names.vnet, "azure: reusing virtual network");
                return Ok(existing);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(Error::Remote { step, source: e }),
        }

        let vnet = VirtualNetwork {
            location: Some(self.region.clone()),
            properties: Some(VirtualNetworkProperties {
                address_space: Some(AddressSpace {
                    address_prefixes: vec![VNET_ADDRESS_SPACE.to_string()],
                }),
            }),
            ..Default::default()
        };
        let begin = self
            .api
            .create_virtual_network(&self.resource_group, &self.names.vnet, &vnet)
            .await;
        let created = complete(step, begin, &self.lro).await?;
        info!(vnet = %self.names.vnet, "azure: virtual network created");
        Ok(created)
    }

    pub async fn subnet(&self, vnet: &VirtualNetwork) -> Result<Subnet> {
        let step = Step::CreateSubnet;
        let vnet_name = vnet.name.as_deref().unwrap_or(&self.names.vnet);

        match self
            .api
            .get_subnet(&self.resource_group, vnet_name, &self.names.subnet)
            .await
        {
            Ok(existing) => {
                info!(subnet = %self.names.subnet, "azure: reusing subnet");
                return Ok(existing);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(Error::Remote { step, source: e }),
        }

        let subnet = Subnet {
            properties: Some(SubnetProperties {
                address_prefix: Some(SUBNET_ADDRESS_PREFIX.to_string()),
            }),
            ..Default::default()
        };
        let begin = self
            .api
            .create_subnet(&self.resource_group, vnet_name, &self.names.subnet, &subnet)
            .await;
        let created = complete(step, begin, &self.lro).await?;
        info!(subnet = %self.names.subnet, "azure: subnet created");
        Ok(created)
    }

    pub async fn network_interface(&self, subnet: &Subnet) -> Result<NetworkInterface> {
        let step = Step::CreateNetworkInterface;
        let subnet_id = subnet.id.clone().ok_or(Error::IncompleteResponse {
            step,
            field: "subnet id",
        })?;

        let nic = NetworkInterface {
            location: Some(self.region.clone()),
            properties: Some(NetworkInterfaceProperties {
                ip_configurations: vec![IpConfiguration {
                    name: Some(IP_CONFIGURATION_NAME.to_string()),
                    properties: Some(IpConfigurationProperties {
                        private_ip_allocation_method: Some("Dynamic".to_string()),
                        private_ip_address: None,
                        subnet: Some(SubResource { id: Some(subnet_id) }),
                    }),
                }],
            }),
            ..Default::default()
        };
        let begin = self
            .api
            .create_network_interface(&self.resource_group, &self.names.nic, &nic)
            .await;
        let created = complete(step, begin, &self.lro).await?;
        info!(nic = %self.names.nic, "azure: network interface created");
        Ok(created)
    }

    pub async fn virtual_machine(&self, nic: &NetworkInterface, spec: &MachineSpec) -> Result<VirtualMachine> {
        let step = Step::CreateVirtualMachine;
        let nic_id = nic.id.clone().ok_or(Error::IncompleteResponse {
            step,
            field: "network interface id",
        })?;

        let vm = VirtualMachine {
            location: Some(self.region.clone()),
            identity: Some(VirtualMachineIdentity { kind: "None".to_string() }),
            properties: Some(VirtualMachineProperties {
                hardware_profile: Some(HardwareProfile {
                    vm_size: Some(spec.vm_size.clone()),
                }),
                storage_profile: Some(StorageProfile {
                    image_reference: Some(spec.image.clone()),
                    os_disk: Some(OsDisk {
                        name: Some(self.names.disk.clone()),
                        create_option: Some("FromImage".to_string()),
                        caching: Some("ReadWrite".to_string()),
                        managed_disk: Some(ManagedDisk {
                            storage_account_type: Some(spec.disk_type.clone()),
                        }),
                        disk_size_gb: Some(spec.disk_size_gb),
                    }),
                }),
                os_profile: Some(OsProfile {
                    computer_name: Some(self.names.vm.clone()),
                    admin_username: Some(ADMIN_USERNAME.to_string()),
                    admin_password: Some(spec.admin_password.clone()),
                    custom_data: Some(spec.custom_data.clone()),
                }),
                network_profile: Some(NetworkProfile {
                    network_interfaces: vec![SubResource { id: Some(nic_id) }],
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let begin = self
            .api
            .create_virtual_machine(&self.resource_group, &self.names.vm, &vm)
            .await;
        let created = complete(step, begin, &self.lro).await?;
        info!(vm = %self.names.vm, size = %spec.vm_size, "azure: virtual machine created");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::testing::{FakeCloud, options};

    fn provisioner(cloud: &Arc<FakeCloud>) -> Provisioner {
        Provisioner::new(
            cloud.clone(),
            LroConfig::default(),
            "daytona",
            "centralus",
            ResourceNames::for_target("t1"),
        )
    }

    #[test]
    fn parses_image_urn() {
        let image = parse_image_urn("Canonical:ubuntu-24_04-lts:server:latest").unwrap();
        assert_eq!(image.publisher, "Canonical");
        assert_eq!(image.offer, "ubuntu-24_04-lts");
        assert_eq!(image.sku, "server");
        assert_eq!(image.version, "latest");
    }

    #[test]
    fn rejects_malformed_urns() {
        for urn in ["bad:urn", "a:b:c:d:e", "a::c:d", ""] {
            let err = parse_image_urn(urn).unwrap_err();
            assert!(err.is_validation(), "{urn} should be rejected");
        }
    }

    #[test]
    fn password_has_required_character_mix() {
        for _ in 0..50 {
            let password = generate_password();
            assert_eq!(password.len(), 12);
            assert_eq!(password.bytes().filter(|b| b.is_ascii_digit()).count(), 3);
            assert_eq!(password.bytes().filter(|b| b.is_ascii_lowercase()).count(), 3);
            assert_eq!(password.bytes().filter(|b| b.is_ascii_uppercase()).count(), 3);
            assert_eq!(password.bytes().collect::<HashSet<_>>().len(), 12);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn creates_resources_in_dependency_order() {
        let cloud = Arc::new(FakeCloud::new());
        let spec = MachineSpec::new(&options(), "ZGF0YQ==".into()).unwrap();

        let vm = provisioner(&cloud).run(&spec).await.unwrap();

        assert_eq!(
            cloud.mutations(),
            vec![
                "create_virtual_network daytona-vnet-t1",
                "create_subnet daytona-subnet-t1",
                "create_network_interface daytona-iface-t1",
                "create_virtual_machine daytona-t1",
            ]
        );
        assert_eq!(vm.vm_size(), Some("Standard_B2s"));

        let stored = cloud.virtual_machine("daytona-t1").unwrap();
        let props = stored.properties.unwrap();
        let os_disk = props.storage_profile.unwrap().os_disk.unwrap();
        assert_eq!(os_disk.name.as_deref(), Some("daytona-t1-disk"));
        assert_eq!(os_disk.create_option.as_deref(), Some("FromImage"));
        assert_eq!(os_disk.caching.as_deref(), Some("ReadWrite"));
        assert_eq!(os_disk.disk_size_gb, Some(30));
        let os_profile = props.os_profile.unwrap();
        assert_eq!(os_profile.admin_username.as_deref(), Some("daytona"));
        assert_eq!(os_profile.custom_data.as_deref(), Some("ZGF0YQ=="));
        assert_eq!(stored.identity.unwrap().kind, "None");
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_existing_network() {
        let cloud = Arc::new(FakeCloud::new());
        let spec = MachineSpec::new(&options(), String::new()).unwrap();
        let provisioner = provisioner(&cloud);

        provisioner.run(&spec).await.unwrap();
        provisioner.run(&spec).await.unwrap();

        assert_eq!(cloud.count("create_virtual_network"), 1);
        assert_eq!(cloud.count("create_subnet"), 1);
        assert_eq!(cloud.count("create_network_interface"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_aborts_later_steps() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.fail_on("create_subnet");
        let spec = MachineSpec::new(&options(), String::new()).unwrap();

        let err = provisioner(&cloud).run(&spec).await.unwrap_err();

        assert!(err.to_string().starts_with("cannot create subnet"));
        assert_eq!(cloud.count("create_network_interface"), 0);
        assert_eq!(cloud.count("create_virtual_machine"), 0);
        assert!(cloud.virtual_network("daytona-vnet-t1").is_some());
    }

    #[test]
    fn malformed_urn_fails_before_any_call() {
        let mut opts = options();
        opts.image_urn = "bad:urn".into();
        assert!(matches!(
            MachineSpec::new(&opts, String::new()),
            Err(Error::InvalidImageUrn(_))
        ));
    }
}
