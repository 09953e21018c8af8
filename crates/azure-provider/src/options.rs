use serde::{Deserialize, Serialize};

use crate::manifest::{
    DEFAULT_DISK_SIZE_GB, DEFAULT_DISK_TYPE, DEFAULT_IMAGE_URN, DEFAULT_REGION, DEFAULT_VM_SIZE,
};
use crate::{Error, Result};

/// Per-target provisioning options, as supplied by the host in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetOptions {
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Tenant Id")]
    pub tenant_id: String,
    #[serde(rename = "Client Id")]
    pub client_id: String,
    #[serde(rename = "Client Secret")]
    pub client_secret: String,
    #[serde(rename = "Subscription Id")]
    pub subscription_id: String,
    #[serde(rename = "Resource Group")]
    pub resource_group: String,
    #[serde(rename = "Image URN")]
    pub image_urn: String,
    #[serde(rename = "VM Size")]
    pub vm_size: String,
    #[serde(rename = "Disk Type")]
    pub disk_type: String,
    #[serde(rename = "Disk Size")]
    pub disk_size: i32,
}

impl TargetOptions {
    /// Parse options, falling back to the `AZURE_*` process environment for
    /// credentials the payload leaves empty.
    pub fn parse(json: &str) -> Result<Self> {
        Self::parse_with_env(json, |key| std::env::var(key).ok())
    }

    /// Like [`TargetOptions::parse`] with an explicit environment lookup.
    pub fn parse_with_env(json: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options: TargetOptions =
            serde_json::from_str(json).map_err(|e| Error::InvalidOptions(e.to_string()))?;

        let fallback = |field: &mut String, key: &str| {
            if field.is_empty()
                && let Some(value) = env(key).filter(|v| !v.is_empty())
            {
                *field = value;
            }
        };
        fallback(&mut options.tenant_id, "AZURE_TENANT_ID");
        fallback(&mut options.client_id, "AZURE_CLIENT_ID");
        fallback(&mut options.client_secret, "AZURE_CLIENT_SECRET");
        fallback(&mut options.subscription_id, "AZURE_SUBSCRIPTION_ID");

        options.apply_defaults();
        options.validate()?;
        Ok(options)
    }

    fn apply_defaults(&mut self) {
        let default = |field: &mut String, value: &str| {
            if field.is_empty() {
                *field = value.to_string();
            }
        };
        default(&mut self.region, DEFAULT_REGION);
        default(&mut self.image_urn, DEFAULT_IMAGE_URN);
        default(&mut self.vm_size, DEFAULT_VM_SIZE);
        default(&mut self.disk_type, DEFAULT_DISK_TYPE);
        if self.disk_size <= 0 {
            self.disk_size = DEFAULT_DISK_SIZE_GB;
        }
    }

    fn validate(&self) -> Result<()> {
        let required = [
            (&self.tenant_id, "AZURE_TENANT_ID"),
            (&self.client_id, "AZURE_CLIENT_ID"),
            (&self.client_secret, "AZURE_CLIENT_SECRET"),
            (&self.subscription_id, "AZURE_SUBSCRIPTION_ID"),
        ];
        if let Some((_, name)) = required.iter().find(|(value, _)| value.is_empty()) {
            return Err(Error::MissingCredential(*name));
        }

        let group_chars = |c: char| c.is_ascii_alphanumeric() || "-_.()".contains(c);
        if !self.resource_group.chars().all(group_chars) {
            return Err(Error::InvalidOptions(format!(
                "resource group name {:?} may only contain letters, digits and -_.()",
                self.resource_group
            )));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            subscription_id: self.subscription_id.clone(),
        }
    }
}

/// Service-principal credentials for one subscription.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "Region": "westeurope",
        "Tenant Id": "t",
        "Client Id": "c",
        "Client Secret": "s",
        "Subscription Id": "sub",
        "Resource Group": "my-rg",
        "Image URN": "Canonical:ubuntu-24_04-lts:server:latest",
        "VM Size": "Standard_D2s_v5",
        "Disk Type": "Premium_LRS",
        "Disk Size": 64
    }"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_host_field_names() {
        let opts = TargetOptions::parse_with_env(FULL, no_env).unwrap();
        assert_eq!(opts.region, "westeurope");
        assert_eq!(opts.resource_group, "my-rg");
        assert_eq!(opts.vm_size, "Standard_D2s_v5");
        assert_eq!(opts.disk_size, 64);
    }

    #[test]
    fn credentials_fall_back_to_environment() {
        let env = |key: &str| match key {
            "AZURE_TENANT_ID" => Some("env-tenant".to_string()),
            "AZURE_CLIENT_ID" => Some("env-client".to_string()),
            "AZURE_CLIENT_SECRET" => Some("env-secret".to_string()),
            "AZURE_SUBSCRIPTION_ID" => Some("env-sub".to_string()),
            _ => None,
        };

        let opts = TargetOptions::parse_with_env(r#"{"Tenant Id": "explicit"}"#, env).unwrap();
        assert_eq!(opts.tenant_id, "explicit");
        assert_eq!(opts.client_id, "env-client");
        assert_eq!(opts.subscription_id, "env-sub");
    }

    #[test]
    fn missing_credential_is_rejected() {
        let json = r#"{"Tenant Id": "t", "Client Id": "c", "Subscription Id": "s"}"#;
        let err = TargetOptions::parse_with_env(json, no_env).unwrap_err();
        assert!(matches!(err, Error::MissingCredential("AZURE_CLIENT_SECRET")));
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "AZURE_CLIENT_SECRET not set in env/target options");
    }

    #[test]
    fn empty_fields_take_manifest_defaults() {
        let json = r#"{"Tenant Id": "t", "Client Id": "c", "Client Secret": "s", "Subscription Id": "sub"}"#;
        let opts = TargetOptions::parse_with_env(json, no_env).unwrap();
        assert_eq!(opts.region, "centralus");
        assert_eq!(opts.image_urn, "Canonical:ubuntu-24_04-lts:server:latest");
        assert_eq!(opts.vm_size, "Standard_B2s");
        assert_eq!(opts.disk_type, "StandardSSD_LRS");
        assert_eq!(opts.disk_size, 30);
        assert!(opts.resource_group.is_empty());
    }

    #[test]
    fn resource_group_with_path_characters_is_rejected() {
        let json = r#"{"Tenant Id": "t", "Client Id": "c", "Client Secret": "s", "Subscription Id": "sub", "Resource Group": "rg/../other?x"}"#;
        let err = TargetOptions::parse_with_env(json, no_env).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn malformed_json_is_invalid_options() {
        let err = TargetOptions::parse_with_env("{not json", no_env).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[test]
    fn debug_redacts_secret() {
        let opts = TargetOptions::parse_with_env(FULL, no_env).unwrap();
        let rendered = format!("{:?}", opts.credentials());
        assert!(!rendered.contains("\"s\""));
        assert!(rendered.contains("<redacted>"));
    }
}
