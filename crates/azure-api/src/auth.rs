use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Error, Result};

const LOGIN_URL: &str = "https://login.microsoftonline.com";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Tokens are refreshed this long before Azure AD says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);

/// Service-principal credential using the OAuth2 client-credentials grant.
///
/// Access tokens are cached until shortly before they expire.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority: LOGIN_URL.into(),
            http,
            cached: Mutex::new(None),
        }
    }

    /// Override the Azure AD authority (sovereign clouds).
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id)
    }

    /// Return a bearer token for the management plane, fetching a new one if
    /// the cached token is missing or about to expire.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.access_token.clone());
        }

        let resp = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth { status, body });
        }

        let token: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!(tenant_id = %self.tenant_id, lifetime_secs = lifetime.as_secs(), "azure: acquired access token");

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Token endpoint issuing `token-{n}` with the given lifetime.
    async fn token_endpoint(expires_in: u64) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let issued = Arc::new(AtomicUsize::new(0));
        let counter = issued.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { return };
                read_request(&mut stream).await;
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let body = format!(r#"{{"access_token":"token-{n}","expires_in":{expires_in},"token_type":"Bearer"}}"#);
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (addr, issued)
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let Ok(n) = stream.read(&mut chunk).await else { return };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn credential(addr: SocketAddr) -> ClientSecretCredential {
        ClientSecretCredential::new("tenant-1", "client", "secret", reqwest::Client::new())
            .with_authority(format!("http://{addr}"))
    }

    #[tokio::test]
    async fn token_is_cached_until_refresh_margin() {
        let (addr, issued) = token_endpoint(3600).await;
        let cred = credential(addr);

        assert_eq!(cred.token().await.unwrap(), "token-1");
        assert_eq!(cred.token().await.unwrap(), "token-1");
        assert_eq!(issued.load(Ordering::SeqCst), 1);

        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(3600) - EXPIRY_MARGIN + Duration::from_secs(1)).await;
        tokio::time::resume();

        assert_eq!(cred.token().await.unwrap(), "token-2");
        assert_eq!(issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_lived_token_is_not_reused() {
        let (addr, issued) = token_endpoint(EXPIRY_MARGIN.as_secs()).await;
        let cred = credential(addr);

        assert_eq!(cred.token().await.unwrap(), "token-1");
        assert_eq!(cred.token().await.unwrap(), "token-2");
        assert_eq!(issued.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn token_url_includes_tenant() {
        let cred = ClientSecretCredential::new("tenant-1", "client", "secret", reqwest::Client::new());
        assert_eq!(
            cred.token_url(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );

        let cred = cred.with_authority("https://login.microsoftonline.us");
        assert_eq!(
            cred.token_url(),
            "https://login.microsoftonline.us/tenant-1/oauth2/v2.0/token"
        );
    }
}
