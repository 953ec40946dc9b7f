//! Endpoint tuning parameters.
//!
//! Everything here is read once when an [`crate::endpoint::Endpoint`] is
//! constructed.  [`EndpointConfig::validate`] rejects values the retry
//! machinery cannot work with.

use std::time::Duration;

use thiserror::Error;

/// Resend an unacknowledged envelope after this long without an ACK.
pub const DEFAULT_RESEND_TIMEOUT: Duration = Duration::from_secs(3);
/// Give up on an envelope after this long (three resend periods).
pub const DEFAULT_FAIL_TIMEOUT: Duration = Duration::from_secs(9);
/// Retry monitor wake-up period; also the granularity of every timeout.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_BURST_COUNT: u32 = 1;
pub const DEFAULT_BURST_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_HISTORY_LEN: usize = 1000;

/// Adjustable reliability parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Elapsed wait after which an unacknowledged envelope is resent.
    pub resend_timeout: Duration,
    /// Total wait after which an acknowledged send is declared failed.
    ///
    /// Blocking sends return `false` at this point; non-blocking sends are
    /// dropped from the pending table and reported as undelivered.
    pub fail_timeout: Duration,
    /// Period of the retry monitor's timeout scan.
    pub monitor_interval: Duration,
    /// How many copies of each datagram are written per send.
    pub burst_count: u32,
    /// Pause between two copies of the same burst.
    pub burst_interval: Duration,
    /// Number of recently received checksums remembered for deduplication.
    pub history_len: usize,
    /// Re-send the ACK when a duplicate of an acknowledged envelope arrives.
    ///
    /// Off by default: duplicates are dropped without any reply.
    pub ack_duplicates: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            resend_timeout: DEFAULT_RESEND_TIMEOUT,
            fail_timeout: DEFAULT_FAIL_TIMEOUT,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            burst_count: DEFAULT_BURST_COUNT,
            burst_interval: DEFAULT_BURST_INTERVAL,
            history_len: DEFAULT_HISTORY_LEN,
            ack_duplicates: false,
        }
    }
}

impl EndpointConfig {
    /// Short timeouts for endpoints on the same host or LAN.
    pub fn local_network() -> Self {
        Self {
            resend_timeout: Duration::from_millis(300),
            fail_timeout: Duration::from_millis(900),
            monitor_interval: Duration::from_millis(20),
            burst_count: 1,
            burst_interval: Duration::from_millis(1),
            ..Self::default()
        }
    }

    /// Redundant bursts and duplicate re-acknowledgement for links that
    /// drop a noticeable share of datagrams.
    pub fn lossy_network() -> Self {
        Self {
            burst_count: 3,
            burst_interval: Duration::from_millis(5),
            ack_duplicates: true,
            ..Self::default()
        }
    }

    /// Set both acknowledgement timeouts.
    pub fn with_timeouts(mut self, resend: Duration, fail: Duration) -> Self {
        self.resend_timeout = resend;
        self.fail_timeout = fail;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Set the burst size and the pause between copies.
    pub fn with_burst(mut self, count: u32, interval: Duration) -> Self {
        self.burst_count = count;
        self.burst_interval = interval;
        self
    }

    pub fn with_history_len(mut self, len: usize) -> Self {
        self.history_len = len;
        self
    }

    pub fn with_ack_duplicates(mut self, enabled: bool) -> Self {
        self.ack_duplicates = enabled;
        self
    }

    /// Check that every numeric parameter is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("resend_timeout", self.resend_timeout),
            ("fail_timeout", self.fail_timeout),
            ("monitor_interval", self.monitor_interval),
            ("burst_interval", self.burst_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if self.burst_count == 0 {
            return Err(ConfigError::NotPositive("burst_count"));
        }
        if self.history_len == 0 {
            return Err(ConfigError::NotPositive("history_len"));
        }
        if self.fail_timeout < self.resend_timeout {
            return Err(ConfigError::FailBeforeResend {
                resend: self.resend_timeout,
                fail: self.fail_timeout,
            });
        }
        Ok(())
    }
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("fail_timeout ({fail:?}) is shorter than resend_timeout ({resend:?})")]
    FailBeforeResend { resend: Duration, fail: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EndpointConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.fail_timeout, config.resend_timeout * 3);
    }

    #[test]
    fn presets_are_valid() {
        assert_eq!(EndpointConfig::local_network().validate(), Ok(()));
        assert_eq!(EndpointConfig::lossy_network().validate(), Ok(()));
    }

    #[test]
    fn zero_burst_count_rejected() {
        let config = EndpointConfig::default().with_burst(0, Duration::from_millis(1));
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("burst_count"))
        );
    }

    #[test]
    fn zero_history_rejected() {
        let config = EndpointConfig::default().with_history_len(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("history_len"))
        );
    }

    #[test]
    fn zero_interval_rejected() {
        let config = EndpointConfig::default().with_monitor_interval(Duration::ZERO);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("monitor_interval"))
        );
    }

    #[test]
    fn fail_shorter_than_resend_rejected() {
        let config = EndpointConfig::default()
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(2));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FailBeforeResend { .. })
        ));
    }
}
