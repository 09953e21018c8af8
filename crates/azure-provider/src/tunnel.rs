//! Overlay network used to reach targets by id.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tracing::info;

/// A bidirectional byte stream to a peer on the overlay.
pub trait OverlayStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> OverlayStream for T {}

pub type BoxStream = Box<dyn OverlayStream>;

/// A joined overlay network.
#[async_trait]
pub trait OverlayNetwork: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxStream>;
}

/// Parameters for joining the overlay as this provider instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub auth_key: String,
    pub control_url: String,
    /// Private state directory, unique per provider instance.
    pub state_dir: PathBuf,
    pub hostname: String,
}

impl TunnelConfig {
    pub fn new(network_key: impl Into<String>, server_url: impl Into<String>, base_path: &Path) -> Self {
        Self {
            auth_key: network_key.into(),
            control_url: server_url.into(),
            state_dir: base_path.join("tsnet").join(uuid::Uuid::new_v4().to_string()),
            hostname: format!("azure-provider-{}", uuid::Uuid::new_v4()),
        }
    }
}

/// Joins an overlay network.
#[async_trait]
pub trait OverlayConnector: Send + Sync {
    async fn connect(&self, config: &TunnelConfig) -> io::Result<Arc<dyn OverlayNetwork>>;
}

/// Overlay backed by the host's own routing table. Works when the host is
/// already a member of the network (for example through a system-wide
/// tailscale daemon with MagicDNS), so target ids resolve as host names.
pub struct HostNetworkConnector;

#[async_trait]
impl OverlayConnector for HostNetworkConnector {
    async fn connect(&self, config: &TunnelConfig) -> io::Result<Arc<dyn OverlayNetwork>> {
        tokio::fs::create_dir_all(&config.state_dir).await?;
        info!(hostname = %config.hostname, control_url = %config.control_url, "tunnel: using host network");
        Ok(Arc::new(HostNetwork))
    }
}

pub struct HostNetwork;

#[async_trait]
impl OverlayNetwork for HostNetwork {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxStream> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Box::new(stream))
    }
}

/// Lazily joined overlay, shared by every dial of one provider instance.
pub struct Tunnel {
    connector: Arc<dyn OverlayConnector>,
    network: OnceCell<Arc<dyn OverlayNetwork>>,
}

impl Tunnel {
    pub fn new(connector: Arc<dyn OverlayConnector>) -> Self {
        Self {
            connector,
            network: OnceCell::new(),
        }
    }

    /// Join on first use. Concurrent first calls connect exactly once; a
    /// failed join is retried by the next call.
    pub async fn get(&self, config: &TunnelConfig) -> io::Result<Arc<dyn OverlayNetwork>> {
        self.network
            .get_or_try_init(|| self.connector.connect(config))
            .await
            .cloned()
    }
}
