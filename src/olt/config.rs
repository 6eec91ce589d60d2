//! Configuration resolution for the OLT session pool.
//!
//! Values follow a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OLT_HOST` | 10.0.0.62 | Device address |
//! | `OLT_PORT` | 22 | Device SSH port |
//! | `OLT_USERNAME` | zte | Login user |
//! | `OLT_PASSWORD` | zte | Login password |
//! | `OLT_KEY_PATH` | unset | Private key file (optional) |
//! | `OLT_VENDOR` | zte | Command/parse profile (`zte`, `huawei`) |
//! | `OLT_CONNECT_TIMEOUT` | 45s | Base connect timeout |
//! | `OLT_COMMAND_TIMEOUT` | 20s | Default per-command timeout |
//! | `OLT_MAX_IDLE_SECS` | 300s | Idle time before a session is reaped |
//! | `OLT_DEAD_GRACE_SECS` | 60s | Idle time after which a dead channel is reaped |
//! | `OLT_REAP_INTERVAL_SECS` | 30s | Reaper cycle |
//! | `OLT_MAX_CONNECT_ATTEMPTS` | 3 | Cumulative connect attempts per caller |
//! | `OLT_RETRY_DELAY_MS` | 1000ms | Initial delay between connect attempts |
//! | `OLT_SETTLE_DELAY_MS` | 5000ms | Device settle time between provisioning steps |
//! | `OLT_MAX_CONNECTIONS` | 50 | Maximum registered caller ids |

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::olt::vendor::Vendor;

pub(crate) const DEFAULT_HOST: &str = "10.0.0.62";
pub(crate) const DEFAULT_PORT: u16 = 22;
pub(crate) const DEFAULT_USERNAME: &str = "zte";
pub(crate) const DEFAULT_PASSWORD: &str = "zte";
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 45;
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 20;
pub(crate) const DEFAULT_MAX_IDLE_SECS: u64 = 300;
pub(crate) const DEFAULT_DEAD_GRACE_SECS: u64 = 60;
pub(crate) const DEFAULT_REAP_INTERVAL_SECS: u64 = 30;
pub(crate) const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub(crate) const DEFAULT_SETTLE_DELAY_MS: u64 = 5000;
pub(crate) const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Maximum delay between connect retries.
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Extra connect timeout granted per failed attempt.
pub(crate) const CONNECT_TIMEOUT_STEP: Duration = Duration::from_secs(10);

/// Upper bound for the escalated connect timeout.
pub(crate) const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) const HOST_ENV_VAR: &str = "OLT_HOST";
pub(crate) const PORT_ENV_VAR: &str = "OLT_PORT";
pub(crate) const USERNAME_ENV_VAR: &str = "OLT_USERNAME";
pub(crate) const PASSWORD_ENV_VAR: &str = "OLT_PASSWORD";
pub(crate) const KEY_PATH_ENV_VAR: &str = "OLT_KEY_PATH";
pub(crate) const VENDOR_ENV_VAR: &str = "OLT_VENDOR";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "OLT_CONNECT_TIMEOUT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "OLT_COMMAND_TIMEOUT";
pub(crate) const MAX_IDLE_ENV_VAR: &str = "OLT_MAX_IDLE_SECS";
pub(crate) const DEAD_GRACE_ENV_VAR: &str = "OLT_DEAD_GRACE_SECS";
pub(crate) const REAP_INTERVAL_ENV_VAR: &str = "OLT_REAP_INTERVAL_SECS";
pub(crate) const MAX_CONNECT_ATTEMPTS_ENV_VAR: &str = "OLT_MAX_CONNECT_ATTEMPTS";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "OLT_RETRY_DELAY_MS";
pub(crate) const SETTLE_DELAY_MS_ENV_VAR: &str = "OLT_SETTLE_DELAY_MS";
pub(crate) const MAX_CONNECTIONS_ENV_VAR: &str = "OLT_MAX_CONNECTIONS";

/// Resolve a value with priority: parameter -> env var -> default.
///
/// Unparseable environment values fall through to the default.
pub(crate) fn resolve<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

fn resolve_string(param: Option<String>, env_var: &str, default: &str) -> String {
    param
        .or_else(|| env::var(env_var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| default.to_string())
}

fn resolve_secs(param: Option<u64>, env_var: &str, default: u64) -> Duration {
    Duration::from_secs(resolve(param, env_var, default))
}

fn resolve_millis(param: Option<u64>, env_var: &str, default: u64) -> Duration {
    Duration::from_millis(resolve(param, env_var, default))
}

/// Connect timeout for the given 1-based attempt number.
///
/// The first attempt uses `base`; each later one adds [`CONNECT_TIMEOUT_STEP`]
/// up to [`MAX_CONNECT_TIMEOUT`]. A base above the cap is left untouched.
pub(crate) fn escalated_connect_timeout(base: Duration, attempt: u32) -> Duration {
    if attempt <= 1 {
        return base;
    }
    let grown = base + CONNECT_TIMEOUT_STEP * (attempt - 1);
    grown.min(MAX_CONNECT_TIMEOUT.max(base))
}

/// Where and how to reach the device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
    pub vendor: Vendor,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl DeviceConfig {
    pub fn from_env() -> Self {
        Self {
            host: resolve_string(None, HOST_ENV_VAR, DEFAULT_HOST),
            port: resolve(None, PORT_ENV_VAR, DEFAULT_PORT),
            username: resolve_string(None, USERNAME_ENV_VAR, DEFAULT_USERNAME),
            password: Some(resolve_string(None, PASSWORD_ENV_VAR, DEFAULT_PASSWORD)),
            key_path: env::var(KEY_PATH_ENV_VAR).ok().filter(|v| !v.is_empty()),
            vendor: resolve(None, VENDOR_ENV_VAR, Vendor::Zte),
            connect_timeout: resolve_secs(None, CONNECT_TIMEOUT_ENV_VAR, DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: resolve_secs(None, COMMAND_TIMEOUT_ENV_VAR, DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// `host:port` form accepted by the SSH connector.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} vendor={} password={} key={} connect_timeout={}s command_timeout={}s",
            self.username,
            self.address(),
            self.vendor,
            if self.password.is_some() { "***" } else { "none" },
            self.key_path.as_deref().unwrap_or("none"),
            self.connect_timeout.as_secs(),
            self.command_timeout.as_secs()
        )
    }
}

/// Lifecycle policy of the session pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_idle: Duration,
    pub dead_grace: Duration,
    pub reap_interval: Duration,
    pub max_connect_attempts: u32,
    pub retry_delay: Duration,
    pub max_connections: usize,
    /// How often `execute` polls the channel for the expected prompt.
    pub poll_interval: Duration,
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self {
            max_idle: resolve_secs(None, MAX_IDLE_ENV_VAR, DEFAULT_MAX_IDLE_SECS),
            dead_grace: resolve_secs(None, DEAD_GRACE_ENV_VAR, DEFAULT_DEAD_GRACE_SECS),
            reap_interval: resolve_secs(None, REAP_INTERVAL_ENV_VAR, DEFAULT_REAP_INTERVAL_SECS),
            max_connect_attempts: resolve(
                None,
                MAX_CONNECT_ATTEMPTS_ENV_VAR,
                DEFAULT_MAX_CONNECT_ATTEMPTS,
            ),
            retry_delay: resolve_millis(None, RETRY_DELAY_MS_ENV_VAR, DEFAULT_RETRY_DELAY_MS),
            max_connections: resolve(None, MAX_CONNECTIONS_ENV_VAR, DEFAULT_MAX_CONNECTIONS),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(DEFAULT_MAX_IDLE_SECS),
            dead_grace: Duration::from_secs(DEFAULT_DEAD_GRACE_SECS),
            reap_interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone)]
pub struct OltConfig {
    pub device: DeviceConfig,
    pub pool: PoolConfig,
    pub settle_delay: Duration,
}

impl OltConfig {
    pub fn from_env() -> Self {
        Self {
            device: DeviceConfig::from_env(),
            pool: PoolConfig::from_env(),
            settle_delay: resolve_millis(None, SETTLE_DELAY_MS_ENV_VAR, DEFAULT_SETTLE_DELAY_MS),
        }
    }
}
