//! Purpose: Device, bridge and timing configuration with defaults for the stock app.
//! Exports: `Config`, `BridgeConfig`, `DeviceConfig`, `TimingConfig`.
//! Role: Loaded once (optionally from TOML) and injected into the session at construction.
//! Invariants: Every field has a default, so an empty file is a valid configuration.
//! Invariants: No module reads device paths or the package name from global state.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::app::AppGeneration;
use crate::core::error::{Error, ErrorKind};
use crate::core::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// adb executable, looked up on PATH when relative
    #[serde(default = "default_adb")]
    pub adb: PathBuf,
    /// Device serial passed as `adb -s`
    #[serde(default)]
    pub serial: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            adb: default_adb(),
            serial: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_package")]
    pub package: String,
    #[serde(default = "default_activity")]
    pub activity: String,
    /// Where source photos are staged
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
    /// Where the app writes stitched panoramas
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Shared-preferences file read by legacy app releases
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
    #[serde(default)]
    pub generation: AppGeneration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            activity: default_activity(),
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            settings_file: default_settings_file(),
            generation: AppGeneration::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_bridge_attempts")]
    pub bridge_attempts: u32,
    #[serde(default = "default_second")]
    pub bridge_delay_ms: u64,
    #[serde(default = "default_launch_attempts")]
    pub launch_attempts: u32,
    /// Pause between starting the app and probing it
    #[serde(default = "default_second")]
    pub launch_settle_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_second")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_pull_attempts")]
    pub pull_attempts: u32,
    #[serde(default = "default_second")]
    pub pull_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bridge_attempts: default_bridge_attempts(),
            bridge_delay_ms: default_second(),
            launch_attempts: default_launch_attempts(),
            launch_settle_ms: default_second(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_second(),
            pull_attempts: default_pull_attempts(),
            pull_delay_ms: default_second(),
        }
    }
}

impl TimingConfig {
    /// Default budgets with every delay set to zero.
    pub fn immediate() -> Self {
        Self {
            bridge_delay_ms: 0,
            launch_settle_ms: 0,
            poll_interval_ms: 0,
            pull_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn bridge_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.bridge_attempts, Duration::from_millis(self.bridge_delay_ms))
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }

    pub fn poll_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.poll_attempts, Duration::from_millis(self.poll_interval_ms))
    }

    pub fn pull_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.pull_attempts, Duration::from_millis(self.pull_delay_ms))
    }
}

fn default_adb() -> PathBuf {
    PathBuf::from("adb")
}

fn default_package() -> String {
    "com.hirota41.misphereconverter".to_string()
}

fn default_activity() -> String {
    ".IntentActivity".to_string()
}

fn default_source_dir() -> String {
    "/mnt/sdcard/panosrc/".to_string()
}

fn default_output_dir() -> String {
    "/mnt/sdcard/MiSphereConverter/".to_string()
}

fn default_settings_file() -> String {
    "/data/data/com.hirota41.misphereconverter/shared_prefs/\
     com.hirota41.misphereconverter_preferences.xml"
        .to_string()
}

fn default_bridge_attempts() -> u32 {
    10
}

fn default_launch_attempts() -> u32 {
    10
}

fn default_poll_attempts() -> u32 {
    60
}

fn default_pull_attempts() -> u32 {
    10
}

fn default_second() -> u64 {
    1000
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            let kind = if err.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Io
            };
            Error::new(kind)
                .with_message("failed to read config file")
                .with_path(path)
                .with_source(err)
        })?;
        let config = Self::from_toml(&text).map_err(|err| err.with_path(path))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid config file")
                .with_source(err)
        })
    }
}
