//! Describes the target options a host can collect from its users.

use std::collections::BTreeMap;

use serde::Serialize;

pub const DEFAULT_REGION: &str = "centralus";
pub const DEFAULT_IMAGE_URN: &str = "Canonical:ubuntu-24_04-lts:server:latest";
pub const DEFAULT_VM_SIZE: &str = "Standard_B2s";
pub const DEFAULT_DISK_TYPE: &str = "StandardSSD_LRS";
pub const DEFAULT_DISK_SIZE_GB: i32 = 30;

const SERVICE_PRINCIPAL_DOCS: &str =
    "https://learn.microsoft.com/en-us/cli/azure/azure-cli-sp-tutorial-1?tabs=bash";

const REGIONS: &[&str] = &[
    "australiaeast",
    "brazilsouth",
    "canadacentral",
    "centralindia",
    "centralus",
    "eastasia",
    "eastus",
    "eastus2",
    "francecentral",
    "germanywestcentral",
    "japaneast",
    "koreacentral",
    "northeurope",
    "norwayeast",
    "southafricanorth",
    "southcentralus",
    "southeastasia",
    "swedencentral",
    "switzerlandnorth",
    "uksouth",
    "westeurope",
    "westus",
    "westus2",
    "westus3",
];

const IMAGE_URNS: &[&str] = &[
    "Canonical:ubuntu-24_04-lts:server:latest",
    "Canonical:0001-com-ubuntu-server-jammy:22_04-lts-gen2:latest",
    "Canonical:0001-com-ubuntu-server-focal:20_04-lts-gen2:latest",
    "Debian:debian-12:12-gen2:latest",
    "Debian:debian-11:11-gen2:latest",
];

const VM_SIZES: &[&str] = &[
    "Standard_B1s",
    "Standard_B1ms",
    "Standard_B2s",
    "Standard_B2ms",
    "Standard_B4ms",
    "Standard_D2s_v5",
    "Standard_D4s_v5",
    "Standard_D8s_v5",
    "Standard_E2s_v5",
    "Standard_E4s_v5",
];

const DISK_TYPES: &[&str] = &[
    "Standard_LRS",
    "StandardSSD_LRS",
    "Premium_LRS",
    "StandardSSD_ZRS",
    "Premium_ZRS",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Int,
}

/// One user-facing target option.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetProperty {
    #[serde(rename = "Type")]
    pub kind: PropertyType,
    pub input_masked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl TargetProperty {
    fn string(description: impl Into<String>) -> Self {
        Self {
            kind: PropertyType::String,
            input_masked: false,
            default_value: None,
            description: description.into(),
            suggestions: Vec::new(),
        }
    }

    fn masked(mut self) -> Self {
        self.input_masked = true;
        self
    }

    fn default_value(mut self, value: impl ToString) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    fn suggestions(mut self, values: &[&str]) -> Self {
        self.suggestions = values.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Option name to property, keyed by the JSON key used in target options.
pub type TargetManifest = BTreeMap<String, TargetProperty>;

pub fn target_manifest() -> TargetManifest {
    let mut manifest = TargetManifest::new();

    manifest.insert(
        "Region".into(),
        TargetProperty::string(format!(
            "The geographic area where Azure resources are hosted. Default is {DEFAULT_REGION}.\n\
             List of available regions can be retrieved using the command:\n\
             \"az account list-locations -o table\""
        ))
        .default_value(DEFAULT_REGION)
        .suggestions(REGIONS),
    );
    manifest.insert(
        "Tenant Id".into(),
        TargetProperty::string(format!(
            "Leave blank if you've set the AZURE_TENANT_ID environment variable, or enter your Tenant Id here.\n\
             To find this, look for \"tenant\" in the output after generating client credentials.\n\
             {SERVICE_PRINCIPAL_DOCS}"
        ))
        .masked(),
    );
    manifest.insert(
        "Client Id".into(),
        TargetProperty::string(format!(
            "Leave blank if you've set the AZURE_CLIENT_ID environment variable, or enter your Client Id here.\n\
             To find this, look for \"appId\" in the output after generating client credentials.\n\
             {SERVICE_PRINCIPAL_DOCS}"
        ))
        .masked(),
    );
    manifest.insert(
        "Client Secret".into(),
        TargetProperty::string(format!(
            "Leave blank if you've set the AZURE_CLIENT_SECRET environment variable, or enter your Client Secret here.\n\
             To find this, look for \"password\" in the output after generating client credentials.\n\
             {SERVICE_PRINCIPAL_DOCS}"
        ))
        .masked(),
    );
    manifest.insert(
        "Subscription Id".into(),
        TargetProperty::string(
            "Leave blank if you've set the AZURE_SUBSCRIPTION_ID environment variable, or enter your Subscription Id here.\n\
             How to find subscription id:\n\
             https://learn.microsoft.com/en-us/azure/azure-portal/get-subscription-tenant-id#find-your-azure-subscription",
        )
        .masked(),
    );
    manifest.insert(
        "Resource Group".into(),
        TargetProperty::string(
            "If not set, a \"daytona\" resource group will be created.\n\
             How to create resource group:\n\
             https://learn.microsoft.com/en-us/azure/azure-resource-manager/management/manage-resource-groups-portal",
        ),
    );
    manifest.insert(
        "Image URN".into(),
        TargetProperty::string(format!(
            "The identifier of the Azure virtual machine image to launch an instance. Default is {DEFAULT_IMAGE_URN}.\n\
             List of available images:\n\
             https://learn.microsoft.com/en-us/azure/virtual-machines/linux/cli-ps-findimage"
        ))
        .default_value(DEFAULT_IMAGE_URN)
        .suggestions(IMAGE_URNS),
    );
    manifest.insert(
        "VM Size".into(),
        TargetProperty::string(format!(
            "The size of the Azure machine. Default is {DEFAULT_VM_SIZE}.\n\
             List of available sizes per location can be retrieved using the command:\n\
             az vm list-sizes --location <your-region> --output table"
        ))
        .default_value(DEFAULT_VM_SIZE)
        .suggestions(VM_SIZES),
    );
    manifest.insert(
        "Disk Type".into(),
        TargetProperty::string(format!(
            "The type of the azure managed disk. Default is {DEFAULT_DISK_TYPE}.\n\
             List of available disk types:\n\
             https://docs.microsoft.com/azure/virtual-machines/linux/disks-types"
        ))
        .default_value(DEFAULT_DISK_TYPE)
        .suggestions(DISK_TYPES),
    );
    manifest.insert(
        "Disk Size".into(),
        TargetProperty {
            kind: PropertyType::Int,
            input_masked: false,
            default_value: Some(DEFAULT_DISK_SIZE_GB.to_string()),
            description: format!(
                "The size of the instance volume, in GB. Default is {DEFAULT_DISK_SIZE_GB} GB. \
                 It is recommended that the disk size should be more than 30 GB."
            ),
            suggestions: Vec::new(),
        },
    );

    manifest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_every_option() {
        let manifest = target_manifest();
        for field in [
            "Region",
            "Tenant Id",
            "Client Id",
            "Client Secret",
            "Subscription Id",
            "Resource Group",
            "Image URN",
            "VM Size",
            "Disk Type",
            "Disk Size",
        ] {
            assert!(manifest.contains_key(field), "missing {field}");
        }
        assert_eq!(manifest.len(), 10);
    }

    #[test]
    fn secrets_are_masked() {
        let manifest = target_manifest();
        assert!(manifest["Client Secret"].input_masked);
        assert!(manifest["Tenant Id"].input_masked);
        assert!(!manifest["Region"].input_masked);
    }

    #[test]
    fn serializes_in_host_format() {
        let manifest = target_manifest();
        let json = serde_json::to_value(&manifest["Disk Size"]).unwrap();
        assert_eq!(json["Type"], "int");
        assert_eq!(json["DefaultValue"], "30");
        assert_eq!(json["InputMasked"], false);
        assert!(json.get("Suggestions").is_none());
    }
}
