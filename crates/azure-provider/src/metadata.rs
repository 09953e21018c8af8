use azure_api::VirtualMachine;
use serde::{Deserialize, Serialize};

/// Facts about a target's live VM, reported to the host as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMetadata {
    pub vm_id: String,
    pub vm_name: String,
    pub vm_size_type: String,
    pub location: String,
    pub created_at: String,
}

impl From<&VirtualMachine> for TargetMetadata {
    fn from(vm: &VirtualMachine) -> Self {
        Self {
            vm_id: vm.id.clone().unwrap_or_default(),
            vm_name: vm.name.clone().unwrap_or_default(),
            vm_size_type: vm.vm_size().unwrap_or_default().to_string(),
            location: vm.location.clone().unwrap_or_default(),
            created_at: vm.time_created().map(|t| t.to_rfc3339()).unwrap_or_default(),
        }
    }
}
