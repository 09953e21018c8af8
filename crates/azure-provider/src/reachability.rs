use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::tunnel::OverlayNetwork;
use crate::{Error, Result};

/// Control port the target agent listens on.
pub const CONTROL_PORT: u16 = 2222;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub port: u16,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            interval: Duration::from_secs(1),
            port: CONTROL_PORT,
        }
    }
}

/// Block until `host` accepts a connection on the control port.
///
/// Each successful probe is closed immediately. A dial is never allowed to
/// run much past the deadline and the pause between attempts is clipped to
/// it, so the call returns no later than the timeout plus one interval.
pub async fn wait_for_dial(network: &dyn OverlayNetwork, host: &str, config: &ReachabilityConfig) -> Result<()> {
    let deadline = Instant::now() + config.timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let budget = deadline.saturating_duration_since(Instant::now()).max(config.interval);
        match tokio::time::timeout(budget, network.dial(host, config.port)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                info!(host, attempts, "target reachable");
                return Ok(());
            }
            Ok(Err(e)) => debug!(host, attempts, error = %e, "dial failed"),
            Err(_) => debug!(host, attempts, "dial attempt timed out"),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::DialTimeout {
                minutes: config.timeout.as_secs_f64() / 60.0,
            });
        }
        tokio::time::sleep(config.interval.min(deadline - now)).await;
    }
}
