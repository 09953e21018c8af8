pub mod azure;
pub mod bootstrap;
pub mod cloud;
pub mod config;
pub mod log_writer;
pub mod lro;
pub mod manifest;
pub mod metadata;
pub mod naming;
pub mod options;
pub mod provider;
pub mod provision;
pub mod reachability;
pub mod resource_group;
pub mod spinner;
pub mod teardown;
pub mod tunnel;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::fmt;
use std::time::Duration;

pub use config::ProviderConfig;
pub use provider::AzureProvider;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid target options: {0}")]
    InvalidOptions(String),

    #[error("invalid target id {0:?}: only ASCII letters, digits and '-' are allowed")]
    InvalidTargetId(String),

    #[error("{0} not set in env/target options")]
    MissingCredential(&'static str),

    #[error("invalid image URN {0:?}: expected publisher:offer:sku:version")]
    InvalidImageUrn(String),

    #[error("resource group {0} not found")]
    ResourceGroupNotFound(String),

    #[error("cannot {step}: {source}")]
    Remote {
        step: Step,
        #[source]
        source: azure_api::Error,
    },

    #[error("cannot {step}: response is missing {field}")]
    IncompleteResponse { step: Step, field: &'static str },

    #[error("cannot {step}: operation did not finish within {}s", .timeout.as_secs())]
    OperationTimedOut { step: Step, timeout: Duration },

    #[error("timeout: dialing timed out after {minutes:.1} minutes")]
    DialTimeout { minutes: f64 },

    #[error("tunnel error: {0}")]
    Tunnel(String),

    #[error("provider not initialized: download url not set, call initialize first")]
    NotInitialized,

    #[error("failed to encode metadata: {0}")]
    Metadata(#[source] serde_json::Error),
}

impl Error {
    /// True when a remote lookup found nothing under the requested name.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceGroupNotFound(_) => true,
            Error::Remote { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True for errors detected locally, before any remote call was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidOptions(_)
                | Error::InvalidTargetId(_)
                | Error::MissingCredential(_)
                | Error::InvalidImageUrn(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::DialTimeout { .. } | Error::OperationTimedOut { .. })
    }

    pub(crate) fn remote(step: Step) -> impl FnOnce(azure_api::Error) -> Error {
        move |source| Error::Remote { step, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single remote step of a target lifecycle operation. Used to label
/// errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ResolveResourceGroup,
    CreateResourceGroup,
    CreateVirtualNetwork,
    CreateSubnet,
    CreateNetworkInterface,
    CreateVirtualMachine,
    GetVirtualMachine,
    StartVirtualMachine,
    StopVirtualMachine,
    DeleteVirtualMachine,
    DeleteDisk,
    DeleteNetworkInterface,
    DeleteSubnet,
    DeleteVirtualNetwork,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveResourceGroup => "resolve resource group",
            Self::CreateResourceGroup => "create resource group",
            Self::CreateVirtualNetwork => "create virtual network",
            Self::CreateSubnet => "create subnet",
            Self::CreateNetworkInterface => "create network interface",
            Self::CreateVirtualMachine => "create virtual machine",
            Self::GetVirtualMachine => "get virtual machine",
            Self::StartVirtualMachine => "start virtual machine",
            Self::StopVirtualMachine => "stop virtual machine",
            Self::DeleteVirtualMachine => "delete virtual machine",
            Self::DeleteDisk => "delete instance disk",
            Self::DeleteNetworkInterface => "delete network interface",
            Self::DeleteSubnet => "delete subnet",
            Self::DeleteVirtualNetwork => "delete virtual network",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_name_the_failing_step() {
        let err = Error::Remote {
            step: Step::CreateSubnet,
            source: azure_api::Error::Operation("quota exceeded".into()),
        };
        assert_eq!(err.to_string(), "cannot create subnet: azure operation error: quota exceeded");
        assert!(!err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn dial_timeout_reports_minutes() {
        let err = Error::DialTimeout { minutes: 10.0 };
        assert_eq!(err.to_string(), "timeout: dialing timed out after 10.0 minutes");
        assert!(err.is_timeout());
    }
}
