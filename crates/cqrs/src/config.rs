//! Bus / worker pool configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_WORKER_THREADS: &str = "KEEL_BUS_WORKER_THREADS";
pub const ENV_MAX_BLOCKING_THREADS: &str = "KEEL_BUS_MAX_BLOCKING_THREADS";
pub const ENV_KEEP_ALIVE_MS: &str = "KEEL_BUS_KEEP_ALIVE_MS";
pub const ENV_MAX_IN_FLIGHT: &str = "KEEL_BUS_MAX_IN_FLIGHT";

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Thread name prefix, also used in logs
    pub name: String,
    /// Core runtime threads (drive the pool, not the handlers)
    pub worker_threads: usize,
    /// Upper bound on threads running handlers
    pub max_blocking_threads: usize,
    /// How long an idle handler thread is kept for reuse
    pub keep_alive: Duration,
    /// Fail fast once this many dispatches are in flight (`None` = unbounded)
    pub max_in_flight: Option<usize>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "keel-bus".to_string(),
            worker_threads: 1,
            max_blocking_threads: 512,
            keep_alive: Duration::from_secs(10),
            max_in_flight: None,
        }
    }
}

impl BusConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    /// Defaults overridden by `KEEL_BUS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `KEEL_BUS_*` keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(threads) = parse(&lookup, ENV_WORKER_THREADS)? {
            config.worker_threads = threads;
        }
        if let Some(threads) = parse(&lookup, ENV_MAX_BLOCKING_THREADS)? {
            config.max_blocking_threads = threads;
        }
        if let Some(ms) = parse::<u64>(&lookup, ENV_KEEP_ALIVE_MS)? {
            config.keep_alive = Duration::from_millis(ms);
        }
        if let Some(limit) = parse(&lookup, ENV_MAX_IN_FLIGHT)? {
            config.max_in_flight = Some(limit);
        }

        if config.worker_threads == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_WORKER_THREADS,
                value: "0".to_string(),
            });
        }
        if config.max_blocking_threads == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_MAX_BLOCKING_THREADS,
                value: "0".to_string(),
            });
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn no_variables_yields_defaults() {
        let config = BusConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, BusConfig::default());
        assert_eq!(config.max_in_flight, None);
    }

    #[test]
    fn variables_override_defaults() {
        let config = BusConfig::from_lookup(lookup_from(&[
            (ENV_WORKER_THREADS, "2"),
            (ENV_MAX_BLOCKING_THREADS, " 16 "),
            (ENV_KEEP_ALIVE_MS, "250"),
            (ENV_MAX_IN_FLIGHT, "8"),
        ]))
        .unwrap();

        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.max_blocking_threads, 16);
        assert_eq!(config.keep_alive, Duration::from_millis(250));
        assert_eq!(config.max_in_flight, Some(8));
    }

    #[test]
    fn unparsable_value_names_the_key() {
        let err = BusConfig::from_lookup(lookup_from(&[(ENV_MAX_IN_FLIGHT, "lots")])).unwrap_err();
        match err {
            ConfigError::Invalid { key, value } => {
                assert_eq!(key, ENV_MAX_IN_FLIGHT);
                assert_eq!(value, "lots");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        let err = BusConfig::from_lookup(lookup_from(&[(ENV_WORKER_THREADS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_WORKER_THREADS, .. }));
    }

    #[test]
    fn builders_set_fields() {
        let config = BusConfig::default()
            .with_name("orders")
            .with_worker_threads(3)
            .with_max_blocking_threads(4)
            .with_keep_alive(Duration::from_secs(1))
            .with_max_in_flight(2);

        assert_eq!(config.name, "orders");
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.max_blocking_threads, 4);
        assert_eq!(config.keep_alive, Duration::from_secs(1));
        assert_eq!(config.max_in_flight, Some(2));
    }
}
