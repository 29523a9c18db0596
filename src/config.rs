#![allow(dead_code)]
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Top-level firmware configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub uart: UartConfig,

    #[validate(nested)]
    pub bms: BmsConfig,

    #[validate(nested)]
    pub inverter: PeripheralConfig,

    #[validate(nested)]
    pub psu: PsuConfig,

    #[validate(nested)]
    pub ats: AtsConfig,

    #[validate(nested)]
    pub mcu: McuConfig,

    #[validate(nested)]
    pub history: HistoryConfig,

    #[validate(nested)]
    pub wireless: WirelessConfig,

    #[validate(nested)]
    pub profile: ProfileFileConfig,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

/// Serial line parameters shared by every peripheral bus.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UartConfig {
    #[validate(length(min = 1))]
    pub device: String,

    #[validate(range(min = 1200, max = 921600))]
    pub baud_rate: u32,

    #[serde(default = "default_uart_timeout_ms")]
    #[validate(range(min = 10, max = 30000))]
    pub timeout_ms: u64,
}

/// BMS-specific thresholds and poll cadence.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_bms_config"))]
pub struct BmsConfig {
    #[validate(range(min = 1, max = 60))]
    pub poll_seconds: u64,

    #[validate(range(min = 2.0, max = 3.3))]
    pub min_cell_v: f32,

    #[validate(range(min = 3.0, max = 4.2))]
    pub max_cell_v: f32,

    #[serde(default = "default_turn_off_confirmations")]
    #[validate(range(min = 1, max = 10))]
    pub turn_off_confirmations: u8,
}

fn validate_bms_config(config: &BmsConfig) -> Result<(), validator::ValidationError> {
    if config.min_cell_v >= config.max_cell_v {
        return Err(validator::ValidationError::new(
            "min_cell_v must be less than max_cell_v",
        ));
    }
    Ok(())
}

/// Shared poll/telemetry cadence for the inverter and PSU clients.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PeripheralConfig {
    #[validate(range(min = 1, max = 60))]
    pub poll_seconds: u64,

    #[serde(default = "default_state_grace_seconds")]
    #[validate(range(min = 1, max = 120))]
    pub grace_seconds: u64,
}

/// PSU-specific poll cadence plus the current-channel MUX's controls, which
/// the inverter has no equivalent of (spec.md §4.5).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PsuConfig {
    #[validate(range(min = 1, max = 60))]
    pub poll_seconds: u64,

    #[serde(default = "default_state_grace_seconds")]
    #[validate(range(min = 1, max = 120))]
    pub grace_seconds: u64,

    /// Any cell at or above this voltage while ACTIVE steps the current
    /// channel down by one (spec.md §4.5).
    #[validate(range(min = 3.0, max = 4.2))]
    pub reduce_current_voltage: f32,
}

/// ATS monitor pins. The switch's two dry contacts (normally-closed on grid,
/// normally-open on battery) are read independently and combined
/// combinationally, not debounced in software (spec.md §4.7).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AtsConfig {
    #[validate(length(min = 1))]
    pub nc_pin: String,

    #[validate(length(min = 1))]
    pub no_pin: String,

    #[serde(default)]
    pub enabled_by_default: bool,
}

/// MCU supervision tick and the wattages used to integrate self-consumption.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct McuConfig {
    #[validate(range(min = 1, max = 3600))]
    pub tick_ms: u64,

    #[validate(length(min = 1))]
    pub firmware_version: String,

    #[serde(default = "default_mcu_power_w")]
    #[validate(range(min = 0.0, max = 10.0))]
    pub mcu_power_w: f32,

    #[serde(default = "default_usb_power_w")]
    #[validate(range(min = 0.0, max = 20.0))]
    pub usb_power_w: f32,

    #[serde(default = "default_bms_power_w")]
    #[validate(range(min = 0.0, max = 10.0))]
    pub bms_power_w: f32,
}

impl McuConfig {
    /// Parse `firmware_version` ("major.minor.patch") into its three parts.
    pub fn parse_version(&self) -> Result<(u8, u8, u8)> {
        let mut parts = self.firmware_version.split('.');
        let major = parts
            .next()
            .context("missing major version")?
            .parse()
            .context("invalid major version")?;
        let minor = parts
            .next()
            .context("missing minor version")?
            .parse()
            .context("invalid minor version")?;
        let patch = parts
            .next()
            .context("missing patch version")?
            .parse()
            .context("invalid patch version")?;
        Ok((major, minor, patch))
    }
}

/// Telemetry ring buffer and wireless-chunking parameters.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct HistoryConfig {
    #[serde(default = "default_history_period_seconds")]
    #[validate(range(min = 1, max = 3600))]
    pub sample_period_seconds: u64,

    #[serde(default = "default_mtu")]
    #[validate(range(min = 8, max = 512))]
    pub mtu: usize,
}

/// Wireless command-surface transport parameters.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct WirelessConfig {
    #[validate(length(min = 1))]
    pub device_name: String,

    #[serde(default = "default_chunk_pacing_ms")]
    #[validate(range(min = 1, max = 1000))]
    pub chunk_pacing_ms: u64,
}

/// Where the profile store persists its JSON blob.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ProfileFileConfig {
    pub path: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_uart_timeout_ms() -> u64 {
    250
}
fn default_state_grace_seconds() -> u64 {
    5
}
fn default_turn_off_confirmations() -> u8 {
    3
}
fn default_mcu_power_w() -> f32 {
    0.5
}
fn default_usb_power_w() -> f32 {
    0.3
}
fn default_bms_power_w() -> f32 {
    0.1
}
fn default_history_period_seconds() -> u64 {
    5
}
fn default_mtu() -> usize {
    20
}
fn default_chunk_pacing_ms() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Configuration is loaded in this order (later overrides earlier):
    /// 1. `config/default.toml` (base configuration)
    /// 2. `config/<environment>.toml`, if an environment is named
    /// 3. Environment variables with the `POWERBOX__` prefix
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    pub fn load_with_env(environment: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Some(env) = environment {
            let env_file = format!("config/{env}.toml");
            figment = figment.merge(Toml::file(env_file));
        } else {
            figment = figment.merge(Toml::file("config/development.toml").nested());
        }

        figment = figment.merge(Env::prefixed("POWERBOX__").split("__"));

        let config: AppConfig = figment.extract().context("failed to parse configuration")?;

        config
            .validate()
            .context("configuration validation failed")?;

        Ok(config)
    }

    pub fn validate_config(self) -> Result<Self> {
        self.validate()
            .context("configuration validation failed")?;
        Ok(self)
    }

    /// Render the resolved configuration back to TOML, for a startup log
    /// line or a `--print-config` diagnostic.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration as TOML")
    }
}
