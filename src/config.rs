use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::snapshot::DocumentPath;

/// Name of the configuration file looked up in the watched root.
pub const CONFIG_FILE: &str = "uid-watch.toml";

/// Upper bound on every configured timer.
pub const MAX_TIMER: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration loaded from `uid-watch.toml` at the watched root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Collection holding the watched document.
    pub collection: String,
    /// Name of the watched document.
    pub document: String,
    /// Field of the document holding the identifier list.
    pub field: String,
    /// Substring marking a well-formed identifier (counted in the status view).
    pub valid_marker: String,
    /// How the console notifier answers permission requests.
    pub notifications: NotificationPolicy,
    pub timing: TimingConfig,
    pub tone: ToneConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            collection: "users".into(),
            document: "userid".into(),
            field: "uids".into(),
            valid_marker: "user_".into(),
            notifications: NotificationPolicy::default(),
            timing: TimingConfig::default(),
            tone: ToneConfig::default(),
        }
    }
}

/// Answer given by the console notifier when permission is queried or requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPolicy {
    Granted,
    Denied,
    /// Not decided yet; a request grants it.
    #[default]
    Prompt,
}

/// Alert timers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval between beep pulses.
    pub pulse_ms: u64,
    /// Delay after each pulse before the tone drops to silence.
    pub drop_ms: u64,
    /// Ceiling on a single ringing session.
    pub ring_secs: u64,
    /// How long a detected identifier stays flagged as new.
    pub alert_clear_secs: u64,
    /// How long a shown notification stays open before the watcher closes it.
    pub notification_close_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pulse_ms: 500,
            drop_ms: 300,
            ring_secs: 20,
            alert_clear_secs: 25,
            notification_close_secs: 10,
        }
    }
}

impl TimingConfig {
    /// Reject timers the alert loop cannot run: a zero pulse never advances, and
    /// anything above [`MAX_TIMER`] can overflow a deadline.
    pub fn validate(&self) -> Result<(), String> {
        if self.pulse_ms == 0 {
            return Err("pulse_ms must be greater than zero".into());
        }
        let max_ms = MAX_TIMER.as_millis() as u64;
        let max_secs = MAX_TIMER.as_secs();
        let timers = [
            ("pulse_ms", self.pulse_ms, max_ms),
            ("drop_ms", self.drop_ms, max_ms),
            ("ring_secs", self.ring_secs, max_secs),
            ("alert_clear_secs", self.alert_clear_secs, max_secs),
            ("notification_close_secs", self.notification_close_secs, max_secs),
        ];
        for (key, value, max) in timers {
            if value > max {
                return Err(format!("{key} = {value} exceeds the maximum of {max}"));
            }
        }
        Ok(())
    }

    /// Interval between pulses, at least one millisecond.
    pub fn pulse(&self) -> Duration {
        bounded(Duration::from_millis(self.pulse_ms.max(1)))
    }

    pub fn drop_after(&self) -> Duration {
        bounded(Duration::from_millis(self.drop_ms))
    }

    pub fn ring(&self) -> Duration {
        bounded(Duration::from_secs(self.ring_secs))
    }

    pub fn alert_clear(&self) -> Duration {
        bounded(Duration::from_secs(self.alert_clear_secs))
    }

    pub fn notification_close(&self) -> Duration {
        bounded(Duration::from_secs(self.notification_close_secs))
    }
}

fn bounded(duration: Duration) -> Duration {
    duration.min(MAX_TIMER)
}

/// Beep tone parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub frequency_hz: f32,
    /// Volume of the "on" phase of each pulse, 0.0 to 1.0.
    pub volume: f32,
    /// Number of bell signals rung when no tone can be synthesized.
    pub fallback_beeps: u32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 800.0,
            volume: 0.3,
            fallback_beeps: 40,
        }
    }
}

impl WatchConfig {
    /// Load configuration from `uid-watch.toml` in the given root directory.
    ///
    /// Returns the default configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(mut config) => {
                    if let Err(reason) = config.timing.validate() {
                        warn!(%reason, "invalid [timing] in {CONFIG_FILE}, using default timers");
                        config.timing = TimingConfig::default();
                    }
                    config
                }
                Err(err) => {
                    warn!(%err, "failed to parse {CONFIG_FILE}, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(%err, "failed to read {CONFIG_FILE}, using defaults");
                Self::default()
            }
        }
    }

    /// The document this configuration watches.
    pub fn document_path(&self) -> DocumentPath {
        DocumentPath::new(&self.collection, &self.document)
    }
}
