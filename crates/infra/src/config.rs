//! Configuration loading and representation.
//!
//! Everything comes from environment variables with sensible defaults, so the
//! service boots with no configuration at all against a local engine.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use seqalign_events::BusConfig;

use crate::retry::RetryPolicy;
use crate::submission::SubmissionError;

const DEFAULT_ENGINE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Base URL of the alignment engine; jobs are submitted to `{engine_url}/align`.
    pub engine_url: String,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
    pub submit_timeout: Duration,
    pub submit_max_attempts: u32,
    pub submit_base_delay: Duration,
    pub event_bus_capacity: usize,
    pub heartbeat_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            database_url: None,
            use_persistent_stores: false,
            submit_timeout: Duration::from_secs(30),
            submit_max_attempts: 3,
            submit_base_delay: Duration::from_millis(1000),
            event_bus_capacity: 256,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys take defaults;
    /// malformed values take defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_addr = parsed(&lookup, "BIND_ADDR", defaults.bind_addr);
        let engine_url = lookup("ENGINE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.engine_url);
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let use_persistent_stores = lookup("USE_PERSISTENT_STORES")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.use_persistent_stores);

        Self {
            bind_addr,
            engine_url,
            database_url,
            use_persistent_stores,
            submit_timeout: Duration::from_secs(parsed(&lookup, "SUBMIT_TIMEOUT_SECS", 30)),
            submit_max_attempts: parsed(&lookup, "SUBMIT_MAX_ATTEMPTS", defaults.submit_max_attempts)
                .max(1),
            submit_base_delay: Duration::from_millis(parsed(&lookup, "SUBMIT_BASE_DELAY_MS", 1000)),
            event_bus_capacity: parsed(&lookup, "EVENT_BUS_CAPACITY", defaults.event_bus_capacity)
                .max(1),
            heartbeat_interval: Duration::from_secs(
                parsed(&lookup, "HEARTBEAT_INTERVAL_SECS", 15u64).max(1),
            ),
        }
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            capacity: self.event_bus_capacity,
            heartbeat_interval: self.heartbeat_interval,
        }
    }

    /// Exponential backoff doubling from `submit_base_delay`; only transient
    /// engine failures are retried.
    pub fn submission_retry_policy(&self) -> RetryPolicy<SubmissionError> {
        RetryPolicy::exponential(self.submit_max_attempts, self.submit_base_delay)
            .retry_if(SubmissionError::is_retryable)
    }

    /// Full submission endpoint.
    pub fn engine_submit_url(&self) -> String {
        format!("{}/align", self.engine_url)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + core::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, default = ?default, "malformed config value; using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.engine_submit_url(), "http://localhost:8000/align");
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("ENGINE_URL", "http://engine:5000/"),
            ("USE_PERSISTENT_STORES", "TRUE"),
            ("DATABASE_URL", "postgres://localhost/seqalign"),
            ("SUBMIT_MAX_ATTEMPTS", " 5 "),
            ("HEARTBEAT_INTERVAL_SECS", "2"),
        ]);

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.engine_submit_url(), "http://engine:5000/align");
        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/seqalign"));
        assert_eq!(cfg.submit_max_attempts, 5);
        assert_eq!(cfg.bus_config().heartbeat_interval, Duration::from_secs(2));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("BIND_ADDR", "not-an-addr"),
            ("SUBMIT_TIMEOUT_SECS", "soon"),
            ("EVENT_BUS_CAPACITY", "-3"),
        ]);

        assert_eq!(cfg.bind_addr, AppConfig::default().bind_addr);
        assert_eq!(cfg.submit_timeout, Duration::from_secs(30));
        assert_eq!(cfg.event_bus_capacity, 256);
    }

    #[test]
    fn retry_policy_follows_config() {
        let cfg = config(&[("SUBMIT_BASE_DELAY_MS", "10")]);
        let policy = cfg.submission_retry_policy();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
    }
}
