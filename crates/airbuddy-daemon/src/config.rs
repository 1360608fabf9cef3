//! Configuration management.

#![allow(dead_code)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::ForegroundTiming;
use crate::scheduler::SchedulerTiming;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sensor configuration
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Reading log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Background scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Button-triggered sampling and display timing
    #[serde(default)]
    pub foreground: ForegroundConfig,

    /// OLED display configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// Button input configuration
    #[serde(default)]
    pub button: ButtonConfig,

    /// Web server configuration
    #[serde(default)]
    pub web: WebConfig,
}

/// Sensor bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// I2C bus device path
    #[serde(default = "default_bus")]
    pub bus: String,

    /// AHT21 address
    #[serde(default = "default_aht21_address")]
    pub aht21_address: u8,

    /// ENS160 address
    #[serde(default = "default_ens160_address")]
    pub ens160_address: u8,

    /// Longest a single sensor call may take before it counts as failed
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Use synthetic readings instead of hardware
    #[serde(default)]
    pub simulate: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bus: default_bus(),
            aht21_address: default_aht21_address(),
            ens160_address: default_ens160_address(),
            read_timeout_ms: default_read_timeout(),
            simulate: false,
        }
    }
}

/// Reading log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Path of the delimited record log
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
        }
    }
}

/// Background scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Enable periodic logging
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Seconds between scheduled readings
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Warmup before each scheduled reading, in seconds
    #[serde(default = "default_scheduler_warmup")]
    pub warmup_secs: u64,

    /// Warmup slice in milliseconds; bounds pause latency
    #[serde(default = "default_slice")]
    pub slice_ms: u64,

    /// Recheck period while paused, in milliseconds
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,

    /// Delay before retrying an abandoned cycle, in seconds
    #[serde(default = "default_retry")]
    pub retry_secs: u64,

    /// Bounded wait for the loop to exit on shutdown, in milliseconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enable: true,
            interval_secs: default_interval(),
            warmup_secs: default_scheduler_warmup(),
            slice_ms: default_slice(),
            idle_poll_ms: default_idle_poll(),
            retry_secs: default_retry(),
            stop_timeout_ms: default_stop_timeout(),
        }
    }
}

impl SchedulerConfig {
    pub fn timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            interval: Duration::from_secs(self.interval_secs),
            warmup: Duration::from_secs(self.warmup_secs),
            slice: Duration::from_millis(self.slice_ms.max(1)),
            idle_poll: Duration::from_millis(self.idle_poll_ms.max(1)),
            retry_after_abandon: Duration::from_secs(self.retry_secs),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

/// Button sampling and display timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForegroundConfig {
    /// Warmup for a button reading, in seconds
    #[serde(default = "default_foreground_warmup")]
    pub warmup_secs: u64,

    #[serde(default = "default_metric_dwell")]
    pub metric_dwell_ms: u64,

    #[serde(default = "default_face_dwell")]
    pub face_dwell_ms: u64,

    #[serde(default = "default_error_ms")]
    pub error_ms: u64,

    #[serde(default = "default_settings_ms")]
    pub settings_ms: u64,

    #[serde(default = "default_spinner_interval")]
    pub spinner_interval_ms: u64,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_foreground_warmup(),
            metric_dwell_ms: default_metric_dwell(),
            face_dwell_ms: default_face_dwell(),
            error_ms: default_error_ms(),
            settings_ms: default_settings_ms(),
            spinner_interval_ms: default_spinner_interval(),
        }
    }
}

impl ForegroundConfig {
    pub fn timing(&self) -> ForegroundTiming {
        ForegroundTiming {
            warmup: Duration::from_secs(self.warmup_secs),
            metric_dwell: Duration::from_millis(self.metric_dwell_ms),
            face_dwell: Duration::from_millis(self.face_dwell_ms),
            error_display: Duration::from_millis(self.error_ms),
            settings_display: Duration::from_millis(self.settings_ms),
            spinner_interval: Duration::from_millis(self.spinner_interval_ms),
        }
    }
}

/// OLED display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Drive the OLED; when false screens are only logged and rendered
    #[serde(default = "default_true")]
    pub enable: bool,

    /// I2C bus device path
    #[serde(default = "default_bus")]
    pub bus: String,

    /// SSD1306 address
    #[serde(default = "default_display_address")]
    pub address: u8,

    /// Rotate the panel 180 degrees
    #[serde(default)]
    pub flip: bool,

    /// TrueType font used for rendering
    #[serde(default = "default_font")]
    pub font: PathBuf,

    /// Length of the boot animation in milliseconds
    #[serde(default = "default_boot_ms")]
    pub boot_ms: u64,

    /// Boot animation frame period in milliseconds
    #[serde(default = "default_boot_frame_ms")]
    pub boot_frame_ms: u64,
}

impl DisplayConfig {
    pub fn boot_duration(&self) -> Duration {
        Duration::from_millis(self.boot_ms)
    }

    pub fn boot_frame(&self) -> Duration {
        Duration::from_millis(self.boot_frame_ms.max(1))
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enable: true,
            bus: default_bus(),
            address: default_display_address(),
            flip: false,
            font: default_font(),
            boot_ms: default_boot_ms(),
            boot_frame_ms: default_boot_frame_ms(),
        }
    }
}

/// Where button actions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ButtonSource {
    /// Sysfs GPIO line
    #[default]
    Gpio,
    /// Lines on standard input
    Stdin,
    /// Only the web API
    None,
}

/// Button input configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonConfig {
    #[serde(default)]
    pub source: ButtonSource,

    /// GPIO line number
    #[serde(default = "default_gpio")]
    pub gpio: u32,

    /// Button pulls the line low when pressed
    #[serde(default = "default_true")]
    pub active_low: bool,

    /// Window for a second press to count as a double click
    #[serde(default = "default_double_click")]
    pub double_click_ms: u64,

    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Line sampling period
    #[serde(default = "default_button_poll")]
    pub poll_ms: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            source: ButtonSource::default(),
            gpio: default_gpio(),
            active_low: true,
            double_click_ms: default_double_click(),
            debounce_ms: default_debounce(),
            poll_ms: default_button_poll(),
        }
    }
}

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Enable the HTTP status API
    #[serde(default)]
    pub enable: bool,

    /// Listen address (e.g., "0.0.0.0:8686")
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_listen(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bus() -> String {
    "/dev/i2c-1".to_string()
}

fn default_aht21_address() -> u8 {
    airbuddy_hw::AHT21_ADDRESS
}

fn default_ens160_address() -> u8 {
    airbuddy_hw::ENS160_ADDRESS
}

fn default_display_address() -> u8 {
    airbuddy_hw::SSD1306_ADDRESS
}

fn default_boot_ms() -> u64 {
    2500
}

fn default_boot_frame_ms() -> u64 {
    83
}

fn default_read_timeout() -> u64 {
    500
}

fn default_log_path() -> PathBuf {
    PathBuf::from("logs/air_records.csv")
}

fn default_interval() -> u64 {
    600
}

fn default_scheduler_warmup() -> u64 {
    30
}

fn default_slice() -> u64 {
    200
}

fn default_idle_poll() -> u64 {
    100
}

fn default_retry() -> u64 {
    1
}

fn default_stop_timeout() -> u64 {
    2000
}

fn default_foreground_warmup() -> u64 {
    6
}

fn default_metric_dwell() -> u64 {
    2500
}

fn default_face_dwell() -> u64 {
    3000
}

fn default_error_ms() -> u64 {
    3000
}

fn default_settings_ms() -> u64 {
    5000
}

fn default_spinner_interval() -> u64 {
    180
}

fn default_font() -> PathBuf {
    PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf")
}

fn default_gpio() -> u32 {
    17
}

fn default_double_click() -> u64 {
    350
}

fn default_debounce() -> u64 {
    50
}

fn default_button_poll() -> u64 {
    10
}

fn default_listen() -> String {
    "0.0.0.0:8686".to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }
}
