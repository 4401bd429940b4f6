//! Engine configuration
//!
//! One recognized set of keys, each with a default and an environment
//! override, so a node can be configured without a config file.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an NSDb node.
///
/// Environment variables:
/// - `NSDB_SHARDING_INTERVAL`: default shard interval (`nsdb.sharding.interval`)
/// - `NSDB_WRITE_SCHEDULER_INTERVAL`: shard flush period (`nsdb.write.scheduler.interval`)
/// - `NSDB_READ_COORDINATOR_TIMEOUT`: ask timeout for read-side requests (`nsdb.read-coordinator.timeout`)
/// - `NSDB_HTTP_ENDPOINT_TIMEOUT`: ask timeout for write-side requests (`nsdb.http-endpoint.timeout`)
/// - `NSDB_STORAGE_BASE_PATH`: root directory for shard indexes (`nsdb.storage.base-path`)
/// - `NSDB_METADATA_DEDUP_LOCATIONS`: drop exact replica duplicates on AddLocation
///   (`nsdb.metadata.dedup-locations`)
///
/// Durations accept an integer with an `ms`, `s`, `m` or `h` suffix.
#[derive(Debug, Clone)]
pub struct NsdbConfig {
    /// Default shard interval used when a metric has no metric info override
    pub sharding_interval: Duration,
    /// Period of the per-metric indexer flush scheduler
    pub write_scheduler_interval: Duration,
    /// Timeout applied to read-coordinator asks
    pub read_coordinator_timeout: Duration,
    /// Timeout applied to write-coordinator and metadata asks
    pub http_endpoint_timeout: Duration,
    /// Root directory under which shard indexes live (`base/db/ns/metric`)
    pub base_path: PathBuf,
    /// Whether AddLocation drops exact `(metric, node, from, to)` duplicates.
    /// Off by default: replicas are appended as the caller provides them.
    pub dedup_locations: bool,
}

impl Default for NsdbConfig {
    fn default() -> Self {
        Self {
            sharding_interval: Duration::from_secs(60),
            write_scheduler_interval: Duration::from_secs(5),
            read_coordinator_timeout: Duration::from_secs(10),
            http_endpoint_timeout: Duration::from_secs(30),
            base_path: PathBuf::from("data/nsdb"),
            dedup_locations: false,
        }
    }
}

impl NsdbConfig {
    /// Build a configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("NSDB_SHARDING_INTERVAL") {
            config.sharding_interval = parse_duration(&raw)?;
        }
        if let Ok(raw) = std::env::var("NSDB_WRITE_SCHEDULER_INTERVAL") {
            config.write_scheduler_interval = parse_duration(&raw)?;
        }
        if let Ok(raw) = std::env::var("NSDB_READ_COORDINATOR_TIMEOUT") {
            config.read_coordinator_timeout = parse_duration(&raw)?;
        }
        if let Ok(raw) = std::env::var("NSDB_HTTP_ENDPOINT_TIMEOUT") {
            config.http_endpoint_timeout = parse_duration(&raw)?;
        }
        if let Ok(raw) = std::env::var("NSDB_STORAGE_BASE_PATH") {
            config.base_path = PathBuf::from(raw);
        }
        if let Ok(raw) = std::env::var("NSDB_METADATA_DEDUP_LOCATIONS") {
            let raw = raw.trim();
            config.dedup_locations = raw == "1" || raw.eq_ignore_ascii_case("true");
        }

        if config.sharding_interval.is_zero() {
            return Err(Error::Config(
                "NSDB_SHARDING_INTERVAL must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    /// The default shard interval in epoch-ms units, as used by bucket math.
    pub fn shard_interval_ms(&self) -> i64 {
        self.sharding_interval.as_millis() as i64
    }
}

/// Parse a duration of the form `<integer><ms|s|m|h>`.
fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::Config(format!("duration {raw:?} is missing a unit suffix")))?;
    let (digits, unit) = raw.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::Config(format!("invalid duration amount in {raw:?}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(Error::Config(format!(
            "unknown duration unit {unit:?} in {raw:?}; use ms, s, m or h"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::{Mutex, OnceLock};

    const TEST_ENV_KEYS: &[&str] = &[
        "NSDB_SHARDING_INTERVAL",
        "NSDB_WRITE_SCHEDULER_INTERVAL",
        "NSDB_READ_COORDINATOR_TIMEOUT",
        "NSDB_HTTP_ENDPOINT_TIMEOUT",
        "NSDB_STORAGE_BASE_PATH",
        "NSDB_METADATA_DEDUP_LOCATIONS",
    ];

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn with_env<F>(overrides: &[(&str, Option<&str>)], f: F)
    where
        F: FnOnce(),
    {
        let _guard = env_lock().lock().expect("env lock poisoned");
        let mut saved: Vec<(&str, Option<OsString>)> = Vec::new();

        for key in TEST_ENV_KEYS {
            saved.push((key, std::env::var_os(key)));
            // SAFETY: tests serialize environment mutation with a global mutex.
            unsafe { std::env::remove_var(key) };
        }

        for (key, value) in overrides {
            match value {
                Some(v) => {
                    // SAFETY: tests serialize environment mutation with a global mutex.
                    unsafe { std::env::set_var(key, v) };
                }
                None => {
                    // SAFETY: tests serialize environment mutation with a global mutex.
                    unsafe { std::env::remove_var(key) };
                }
            }
        }

        f();

        for (key, value) in saved {
            match value {
                Some(v) => {
                    // SAFETY: tests serialize environment mutation with a global mutex.
                    unsafe { std::env::set_var(key, v) };
                }
                None => {
                    // SAFETY: tests serialize environment mutation with a global mutex.
                    unsafe { std::env::remove_var(key) };
                }
            }
        }
    }

    #[test]
    fn defaults_match_recognized_keys() {
        with_env(&[], || {
            let config = NsdbConfig::from_env().unwrap();
            assert_eq!(config.sharding_interval, Duration::from_secs(60));
            assert_eq!(config.write_scheduler_interval, Duration::from_secs(5));
            assert_eq!(config.read_coordinator_timeout, Duration::from_secs(10));
            assert_eq!(config.http_endpoint_timeout, Duration::from_secs(30));
            assert!(!config.dedup_locations);
        });
    }

    #[test]
    fn env_overrides_are_applied() {
        with_env(
            &[
                ("NSDB_SHARDING_INTERVAL", Some("5m")),
                ("NSDB_WRITE_SCHEDULER_INTERVAL", Some("500ms")),
                ("NSDB_METADATA_DEDUP_LOCATIONS", Some("true")),
            ],
            || {
                let config = NsdbConfig::from_env().unwrap();
                assert_eq!(config.sharding_interval, Duration::from_secs(300));
                assert_eq!(config.write_scheduler_interval, Duration::from_millis(500));
                assert!(config.dedup_locations);
            },
        );
    }

    #[test]
    fn unknown_duration_unit_is_rejected() {
        with_env(&[("NSDB_SHARDING_INTERVAL", Some("60d"))], || {
            let err = NsdbConfig::from_env().expect_err("unknown unit should fail");
            assert!(
                err.to_string().contains("unknown duration unit"),
                "unexpected error: {err}"
            );
        });
    }

    #[test]
    fn zero_sharding_interval_is_rejected() {
        with_env(&[("NSDB_SHARDING_INTERVAL", Some("0s"))], || {
            let err = NsdbConfig::from_env().expect_err("zero interval should fail");
            assert!(
                err.to_string().contains("greater than zero"),
                "unexpected error: {err}"
            );
        });
    }

    #[test]
    fn shard_interval_ms_matches_duration() {
        let config = NsdbConfig::default();
        assert_eq!(config.shard_interval_ms(), 60_000);
    }
}
