use crate::core::{PhantomError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a swap-in does when the archive has no entry for a phantom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveMissPolicy {
    /// Promote the shell to a degraded full document holding only its shell fields.
    #[default]
    Placeholder,
    /// Leave the document phantom so a later swap-in can retry.
    KeepPhantom,
}

/// Engine configuration
///
/// Timings are stored in milliseconds so the struct round-trips through
/// JSON settings unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle time after which an eligible document is phantomized
    pub idle_threshold_ms: u64,

    /// Delay between two decay scans
    pub check_interval_ms: u64,

    /// Upper bound on waiting for an idle window before a scan runs anyway
    pub idle_wait_ceiling_ms: u64,

    /// Delay before the first aggressive scan after startup
    pub initial_scan_delay_ms: u64,

    /// Run the first aggressive scan at all
    pub initial_scan: bool,

    /// Notify on every hydration
    pub verbose_notifications: bool,

    /// Raise swap/hydration telemetry from DEBUG to INFO
    pub debug_mode: bool,

    pub archive_miss_policy: ArchiveMissPolicy,

    /// Keep archive entries after a successful swap-in
    pub retain_archive_entries: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 30 * 60 * 1000, // 30 minutes
            check_interval_ms: 5 * 60 * 1000,  // 5 minutes
            idle_wait_ceiling_ms: 2_000,
            initial_scan_delay_ms: 5_000,
            initial_scan: true,
            verbose_notifications: false,
            debug_mode: false,
            archive_miss_policy: ArchiveMissPolicy::Placeholder,
            retain_archive_entries: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a JSON object; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PhantomError::Config(format!("Failed to parse engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PhantomError::Serialization(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(PhantomError::Config(
                "check_interval_ms must be greater than zero".to_string(),
            ));
        }
        if i64::try_from(self.idle_threshold_ms).is_err() {
            return Err(PhantomError::Config(format!(
                "idle_threshold_ms must not exceed {}",
                i64::MAX
            )));
        }
        Ok(())
    }

    /// Set the idle threshold
    pub fn idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold_ms = saturating_millis(threshold);
        self
    }

    /// Set the scan cadence
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval_ms = saturating_millis(interval);
        self
    }

    /// Set the idle-window wait ceiling
    pub fn idle_wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.idle_wait_ceiling_ms = saturating_millis(ceiling);
        self
    }

    /// Set the delay of the initial scan
    pub fn initial_scan_delay(mut self, delay: Duration) -> Self {
        self.initial_scan_delay_ms = saturating_millis(delay);
        self
    }

    pub fn initial_scan(mut self, enabled: bool) -> Self {
        self.initial_scan = enabled;
        self
    }

    pub fn verbose_notifications(mut self, enabled: bool) -> Self {
        self.verbose_notifications = enabled;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    pub fn archive_miss_policy(mut self, policy: ArchiveMissPolicy) -> Self {
        self.archive_miss_policy = policy;
        self
    }

    pub fn retain_archive_entries(mut self, retain: bool) -> Self {
        self.retain_archive_entries = retain;
        self
    }

    pub fn idle_threshold_duration(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn check_interval_duration(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn idle_wait_ceiling_duration(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ceiling_ms)
    }

    pub fn initial_scan_delay_duration(&self) -> Duration {
        Duration::from_millis(self.initial_scan_delay_ms)
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
