use std::env;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LISTEN_ADDR must be a valid socket address, got {0:?}")]
    ListenAddr(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Bearer key required on every route when set.
    pub api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".into());

        Ok(Self {
            listen_addr: listen_addr
                .parse()
                .map_err(|_| ConfigError::ListenAddr(listen_addr.clone()))?,
            api_key: env::var("PROVIDER_API_KEY").ok().filter(|k| !k.is_empty()),
        })
    }
}
