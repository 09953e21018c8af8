use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::manifest::TargetManifest;

/// Host-supplied settings, sent once before any target operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub base_path: String,
    pub daytona_download_url: String,
    #[serde(default)]
    pub daytona_version: String,
    pub server_url: String,
    pub network_key: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_port: u32,
    #[serde(default)]
    pub server_port: u32,
    #[serde(default)]
    pub target_logs_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    /// Authorizes the agent download from the host.
    #[serde(default)]
    pub api_key: String,
    /// Target options as a JSON document.
    pub options: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetRequest {
    pub target: Target,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub name: String,
    pub label: Option<String>,
    pub version: String,
    pub target_config_manifest: TargetManifest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementStatus {
    pub name: String,
    pub met: bool,
    pub reason: String,
}

/// A named, pre-filled set of target options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub name: String,
    pub provider_name: String,
    pub options: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_request_accepts_minimal_body() {
        let req: InitializeRequest = serde_json::from_str(
            r#"{
                "basePath": "/var/lib/daytona",
                "daytonaDownloadUrl": "https://srv/download",
                "serverUrl": "https://ctl",
                "networkKey": "nk"
            }"#,
        )
        .unwrap();
        assert_eq!(req.daytona_download_url, "https://srv/download");
        assert!(req.target_logs_dir.is_none());
    }

    #[test]
    fn target_request_uses_camel_case() {
        let req: TargetRequest = serde_json::from_str(
            r#"{"target": {"id": "t1", "envVars": {"A": "1"}, "apiKey": "k", "options": "{}"}}"#,
        )
        .unwrap();
        assert_eq!(req.target.env_vars["A"], "1");
        assert_eq!(req.target.api_key, "k");
    }
}
