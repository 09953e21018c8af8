use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::lro::LroConfig;
use crate::reachability::ReachabilityConfig;
use crate::spinner;

/// Tunables of the provisioning engine. Defaults match the behaviour hosts
/// expect; each can be overridden from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub reachability: ReachabilityConfig,
    pub lro: LroConfig,
    pub spinner_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            reachability: ReachabilityConfig::default(),
            lro: LroConfig::default(),
            spinner_interval: spinner::DEFAULT_INTERVAL,
        }
    }
}

impl ProviderConfig {
    /// Read overrides from `AZURE_PROVIDER_*` variables (and `.env`).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            parse_or(&lookup, key, default.as_secs()).map_or(default, Duration::from_secs)
        };
        let millis = |key: &str, default: Duration| {
            parse_or(&lookup, key, default.as_millis() as u64).map_or(default, Duration::from_millis)
        };

        Self {
            reachability: ReachabilityConfig {
                timeout: secs("AZURE_PROVIDER_DIAL_TIMEOUT_SECS", defaults.reachability.timeout),
                interval: millis("AZURE_PROVIDER_DIAL_INTERVAL_MS", defaults.reachability.interval),
                port: parse_or(&lookup, "AZURE_PROVIDER_CONTROL_PORT", defaults.reachability.port)
                    .unwrap_or(defaults.reachability.port),
            },
            lro: LroConfig {
                poll_interval: secs("AZURE_PROVIDER_POLL_INTERVAL_SECS", defaults.lro.poll_interval),
                max_wait: lookup("AZURE_PROVIDER_OPERATION_TIMEOUT_SECS")
                    .and_then(|raw| parse_value::<u64>("AZURE_PROVIDER_OPERATION_TIMEOUT_SECS", &raw))
                    .map(Duration::from_secs),
            },
            spinner_interval: millis("AZURE_PROVIDER_SPINNER_INTERVAL_MS", defaults.spinner_interval),
        }
    }
}

/// `Some(value)` when the variable is unset or valid, `None` when it is set
/// to something unparseable (already logged).
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Option<T> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Some(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "ignoring invalid config value, using default");
            None
        }
    }
}
