//! Client configuration.
//!
//! Everything the client needs is carried in an explicit [`ClientConfig`]
//! passed to [`SealedComputeClient`](crate::client::SealedComputeClient).
//! There is no process-wide configuration.
//!
//! # Example Configuration File
//!
//! ```toml
//! worker_url = "http://localhost:3346"
//! worker_address = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
//! default_gas_limit = 1000000
//! default_gas_price = 100
//!
//! [poll]
//! interval_ms = 500
//! max_attempts = 120
//! backoff = { kind = "exponential", factor = 1.5, max_interval_ms = 5000 }
//!
//! [retry]
//! max_attempts = 4
//! base_delay_ms = 250
//!
//! [status_codes]
//! failed = 4
//! ```

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use sealed_compute_types::{parse_address, Address, Result, StatusCodes, TaskError};

/// Prefix of the environment variables read by [`ClientConfig::from_env`].
pub const ENV_PREFIX: &str = "SEALED_COMPUTE_";

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the Worker Service.
    #[serde(default)]
    pub worker_url: Option<String>,

    /// Expected signer of worker results and encryption keys. When unset,
    /// the signer of the worker encryption key is trusted.
    #[serde(default)]
    pub worker_address: Option<Address>,

    /// Gas limit used by [`TaskRequest`](crate::client::TaskRequest)s that
    /// do not set one.
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,

    /// Gas price in grains used when a request does not set one.
    #[serde(default = "default_gas_price")]
    pub default_gas_price: u64,

    /// Per-request timeout for Worker Service calls, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Status polling behaviour.
    #[serde(default)]
    pub poll: PollConfig,

    /// Worker transport retry behaviour.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Mapping of raw ledger status codes.
    #[serde(default)]
    pub status_codes: StatusCodes,
}

fn default_gas_limit() -> u64 {
    1_000_000
}

fn default_gas_price() -> u64 {
    100
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            worker_url: None,
            worker_address: None,
            default_gas_limit: default_gas_limit(),
            default_gas_price: default_gas_price(),
            request_timeout_ms: default_request_timeout(),
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
            status_codes: StatusCodes::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Worker Service endpoint.
    pub fn with_worker_url(mut self, url: impl Into<String>) -> Self {
        self.worker_url = Some(url.into());
        self
    }

    /// Pins the expected worker signer.
    pub fn with_worker_address(mut self, address: Address) -> Self {
        self.worker_address = Some(address);
        self
    }

    /// Replaces the polling configuration.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Replaces the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TaskError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TaskError::Configuration(e.to_string()))
    }

    /// Load configuration from environment variables.
    ///
    /// Recognized variables (all optional, prefixed with `SEALED_COMPUTE_`):
    /// - `WORKER_URL`, `WORKER_ADDRESS`
    /// - `GAS_LIMIT`, `GAS_PRICE`, `REQUEST_TIMEOUT_MS`
    /// - `POLL_INTERVAL_MS`, `POLL_MAX_ATTEMPTS`
    /// - `RETRY_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(url) = get("WORKER_URL") {
            config.worker_url = Some(url);
        }
        if let Some(address) = get("WORKER_ADDRESS") {
            config.worker_address = Some(
                parse_address(&address)
                    .map_err(|e| TaskError::Configuration(format!("WORKER_ADDRESS: {e}")))?,
            );
        }
        if let Some(v) = get("GAS_LIMIT") {
            config.default_gas_limit = parse_var("GAS_LIMIT", &v)?;
        }
        if let Some(v) = get("GAS_PRICE") {
            config.default_gas_price = parse_var("GAS_PRICE", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_var("REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            config.poll.interval_ms = parse_var("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("POLL_MAX_ATTEMPTS") {
            config.poll.max_attempts = parse_var("POLL_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_var("RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("RETRY_BASE_DELAY_MS") {
            config.retry.base_delay_ms = parse_var("RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = get("RETRY_MAX_DELAY_MS") {
            config.retry.max_delay_ms = parse_var("RETRY_MAX_DELAY_MS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that could never complete a task.
    pub fn validate(&self) -> Result<()> {
        self.poll.validate()?;
        self.retry.validate()?;
        self.status_codes.validate()?;
        if self.request_timeout_ms == 0 {
            return Err(TaskError::Configuration(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| TaskError::Configuration(format!("{ENV_PREFIX}{name}: {e}")))
}

/// How the delay between status reads evolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Always wait `interval_ms`.
    #[default]
    Fixed,
    /// Multiply the delay by `factor` after each read, up to
    /// `max_interval_ms`.
    Exponential {
        /// Growth factor per read.
        factor: f64,
        /// Upper bound on the delay.
        max_interval_ms: u64,
    },
}

/// Status polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between reads, in milliseconds.
    pub interval_ms: u64,
    /// Reads issued before giving up with a timeout.
    pub max_attempts: u32,
    /// Delay growth strategy.
    pub backoff: Backoff,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            max_attempts: 60,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollConfig {
    /// Fixed-interval polling.
    pub fn fixed(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay to wait after the `reads`-th read (1-based).
    pub fn delay_after(&self, reads: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed => Duration::from_millis(self.interval_ms),
            Backoff::Exponential {
                factor,
                max_interval_ms,
            } => {
                let exponent = i32::try_from(reads.saturating_sub(1)).unwrap_or(i32::MAX);
                let scaled = self.interval_ms as f64 * factor.powi(exponent);
                let capped = scaled.min(*max_interval_ms as f64).max(0.0);
                Duration::from_millis(capped as u64)
            },
        }
    }

    /// Rejects zero intervals and attempts, and shrinking backoff.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(TaskError::Configuration(
                "poll.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(TaskError::Configuration(
                "poll.max_attempts must be greater than zero".to_string(),
            ));
        }
        if let Backoff::Exponential {
            factor,
            max_interval_ms,
        } = &self.backoff
        {
            if !factor.is_finite() || *factor < 1.0 {
                return Err(TaskError::Configuration(format!(
                    "poll.backoff.factor must be >= 1.0, got {factor}"
                )));
            }
            if *max_interval_ms < self.interval_ms {
                return Err(TaskError::Configuration(
                    "poll.backoff.max_interval_ms must be >= poll.interval_ms".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Transport retry configuration for Worker Service calls.
///
/// Backoff formula: `base * 2^(attempt - 1)`, capped at `max_delay_ms`, with
/// +/-25% jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Un-jittered delay after the failed attempt number `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// [`base_delay`](Self::base_delay) with +/-25% jitter.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_millis() as u64;
        let range = base / 4;
        if range == 0 {
            return Duration::from_millis(base);
        }
        let offset = rand::thread_rng().gen_range(0..=range * 2);
        Duration::from_millis(base - range + offset)
    }

    /// Rejects a zero attempt budget.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TaskError::Configuration(
                "retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
