use std::env;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use governor::Quota;
use crate::utils::TrustedProxies;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub http_port: u16,
    pub beacon_port: u16,

    // Health probes
    pub probe_timeout_secs: u64,

    // Rate limiting configs
    pub server_list_period_secs: u64,
    pub server_list_burst_limit: u32,
    pub beacon_period_secs: u64,
    pub beacon_burst_limit: u32,

    /// Proxies allowed to report the client address in `X-Forwarded-For`.
    pub trusted_proxies: TrustedProxies,

    /// A previously published server list to start from.
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            beacon_port: 8080,
            probe_timeout_secs: 5,
            server_list_period_secs: 1,
            server_list_burst_limit: 10,
            beacon_period_secs: 1,
            beacon_burst_limit: 20,
            trusted_proxies: TrustedProxies::default(),
            seed_file: None,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn quota(period_secs: u64, burst_limit: u32) -> Quota {
    let burst = NonZeroU32::new(burst_limit).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(Duration::from_secs(period_secs))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_or("BIND_ADDRESS", defaults.bind_address),
            http_port: env_or("HTTP_PORT", defaults.http_port),
            beacon_port: env_or("BEACON_PORT", defaults.beacon_port),
            probe_timeout_secs: env_or("PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs),
            server_list_period_secs: env_or("SERVER_LIST_PERIOD_SECS", defaults.server_list_period_secs),
            server_list_burst_limit: env_or("SERVER_LIST_BURST_LIMIT", defaults.server_list_burst_limit),
            beacon_period_secs: env_or("BEACON_PERIOD_SECS", defaults.beacon_period_secs),
            beacon_burst_limit: env_or("BEACON_BURST_LIMIT", defaults.beacon_burst_limit),
            trusted_proxies: env::var("TRUSTED_PROXIES")
                .map(|list| TrustedProxies::parse_list(&list))
                .unwrap_or(defaults.trusted_proxies),
            seed_file: env::var("SEED_FILE").ok().filter(|v| !v.is_empty()).map(PathBuf::from),
        }
    }

    pub fn http_bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.http_port)
    }

    pub fn beacon_bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.beacon_port)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn server_list_quota(&self) -> Quota {
        quota(self.server_list_period_secs, self.server_list_burst_limit)
    }

    pub fn beacon_quota(&self) -> Quota {
        quota(self.beacon_period_secs, self.beacon_burst_limit)
    }
}
