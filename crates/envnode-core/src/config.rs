//! Timing constants, runtime configuration and input validation
//!
//! The intervals here drive every duty of the scheduler. The only value that
//! can change at runtime is the sample interval, and only through
//! [`parse_interval`] followed by an [`IntervalSignal`] that the scheduler
//! drains at the start of a tick.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Time between two raw sensor reads
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Length of one averaging window (one upload per window)
pub const WINDOW_INTERVAL: Duration = Duration::from_secs(300);

/// Fixed retry interval while the link is down
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// How long each status screen stays up before the next refresh
pub const DISPLAY_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on a single upload attempt
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Period of the cooperative tick loop
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Reset the node when the tick loop has not run for this long
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of upload tasks alive at the same time
pub const MAX_INFLIGHT_UPLOADS: usize = 4;

/// Smallest interval (seconds) accepted on the config surface
pub const MIN_INTERVAL_SECS: u32 = 10;

/// Largest interval (seconds) accepted on the config surface
pub const MAX_INTERVAL_SECS: u32 = 3600;

/// Mailbox carrying a validated interval from the web surface to the scheduler
pub type IntervalSignal = Signal<CriticalSectionRawMutex, Duration>;

/// Intervals the scheduler is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    pub sample_interval: Duration,
    pub window_interval: Duration,
    pub reconnect_interval: Duration,
    pub display_interval: Duration,
    pub upload_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sample_interval: SAMPLE_INTERVAL,
            window_interval: WINDOW_INTERVAL,
            reconnect_interval: RECONNECT_INTERVAL,
            display_interval: DISPLAY_INTERVAL,
            upload_timeout: UPLOAD_TIMEOUT,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub upload: UploadTarget<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

/// Where averaged readings are sent
///
/// The host is a literal IPv4 address; the node does not resolve names.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

/// Validate the `interval` value of a config update.
///
/// The value must consist only of ASCII digits and lie in
/// [`MIN_INTERVAL_SECS`]..=[`MAX_INTERVAL_SECS`]. An empty value reads as
/// zero and is therefore out of range.
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::NotNumeric);
    }

    let out_of_range = ConfigError::OutOfRange {
        min: MIN_INTERVAL_SECS,
        max: MAX_INTERVAL_SECS,
    };

    // Digits only at this point, so the only parse failures are empty input
    // and overflow; both are out of range.
    let secs: u32 = raw.parse().map_err(|_| out_of_range)?;
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        return Err(out_of_range);
    }

    Ok(Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_accepts_bounds() {
        assert_eq!(parse_interval("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_interval("3600"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_interval("0045"), Ok(Duration::from_secs(45)));
    }

    #[test]
    fn test_parse_interval_rejects_out_of_range() {
        let expected = Err(ConfigError::OutOfRange {
            min: 10,
            max: 3600,
        });
        assert_eq!(parse_interval("9"), expected);
        assert_eq!(parse_interval("3601"), expected);
        assert_eq!(parse_interval(""), expected);
        assert_eq!(parse_interval("99999999999999999999"), expected);
    }

    #[test]
    fn test_parse_interval_rejects_non_digits() {
        assert_eq!(parse_interval("-30"), Err(ConfigError::NotNumeric));
        assert_eq!(parse_interval("30s"), Err(ConfigError::NotNumeric));
        assert_eq!(parse_interval(" 30"), Err(ConfigError::NotNumeric));
        assert_eq!(parse_interval("1e3"), Err(ConfigError::NotNumeric));
    }

    #[test]
    fn test_config_borrows_from_json() {
        let json = r#"{
            "internet": { "ssid": "lab", "password": "hunter2" },
            "upload": { "host": "192.168.1.20", "port": 8080, "path": "/log" }
        }"#;
        let config: Config<'_> = serde_json::from_str(json).unwrap();

        assert_eq!(config.internet.ssid, "lab");
        assert_eq!(config.internet.password, "hunter2");
        assert_eq!(
            config.upload,
            UploadTarget {
                host: "192.168.1.20",
                port: 8080,
                path: "/log"
            }
        );
    }

    #[test]
    fn test_watchdog_outlasts_every_tick_duty() {
        assert!(WATCHDOG_TIMEOUT > TICK_INTERVAL * 100);
        assert!(WATCHDOG_TIMEOUT > DISPLAY_INTERVAL);
        assert!(WATCHDOG_TIMEOUT > RECONNECT_INTERVAL);
    }

    #[test]
    fn test_default_config_matches_constants() {
        let config = NodeConfig::default();
        assert_eq!(config.sample_interval, SAMPLE_INTERVAL);
        assert_eq!(config.window_interval, WINDOW_INTERVAL);
        assert_eq!(config.reconnect_interval, RECONNECT_INTERVAL);
    }
}
