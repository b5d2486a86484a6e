//! Configuration management for the Kontrol bridge
//!
//! Handles loading, defaulting and validation of the YAML configuration file.
//! Every section is optional; an empty file yields the stock keyboard setup.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub native_plugin: NativePluginConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MIDI port configuration (case-insensitive substrings of port names)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
}

/// Which flavour of the controller script this instance plays
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// Full integration: arm-driven focus and transport buttons
    #[default]
    Daw,
    /// Display only: focus is reported but never changed from the keyboard
    MidiKeyboard,
}

/// Focus engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub role: DeviceRole,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Recognition rules for the vendor's own plugin
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativePluginConfig {
    #[serde(default = "default_display_prefix")]
    pub display_prefix: String,
    #[serde(default = "default_parameter_tag")]
    pub parameter_tag: String,
    #[serde(default = "default_plugin_classes")]
    pub plugin_classes: Vec<String>,
}

/// Best-effort TCP announcement of focus changes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub broadcast: bool,
    #[serde(default = "default_diagnostics_address")]
    pub address: String,
    #[serde(default = "default_diagnostics_timeout_ms")]
    pub timeout_ms: u64,
}

/// Log output settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Also write logs to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            role: DeviceRole::default(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for NativePluginConfig {
    fn default() -> Self {
        Self {
            display_prefix: default_display_prefix(),
            parameter_tag: default_parameter_tag(),
            plugin_classes: default_plugin_classes(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            broadcast: false,
            address: default_diagnostics_address(),
            timeout_ms: default_diagnostics_timeout_ms(),
        }
    }
}

impl ControllerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl BridgeConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to load config: {}", path))?;

        Ok(config)
    }

    /// Load the file if it exists; `None` when there is no file
    pub async fn load_optional(path: &str) -> Result<Option<Self>> {
        if Path::new(path).exists() {
            Self::load(path).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        // An empty document deserialises to null
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: BridgeConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(port) = &self.midi.input_port {
            if port.trim().is_empty() {
                bail!("MIDI input_port cannot be empty (omit it instead)");
            }
        }
        if let Some(port) = &self.midi.output_port {
            if port.trim().is_empty() {
                bail!("MIDI output_port cannot be empty (omit it instead)");
            }
        }

        if self.controller.debounce_ms > MAX_DEBOUNCE_MS {
            bail!(
                "controller.debounce_ms {} is too large (max {})",
                self.controller.debounce_ms,
                MAX_DEBOUNCE_MS
            );
        }

        let native = &self.native_plugin;
        if native.display_prefix.is_empty() {
            bail!("native_plugin.display_prefix cannot be empty");
        }
        if native.parameter_tag.is_empty() {
            bail!("native_plugin.parameter_tag cannot be empty");
        }
        if native.plugin_classes.is_empty() {
            bail!("native_plugin.plugin_classes needs at least one class name");
        }

        if self.diagnostics.broadcast {
            let valid_port = self
                .diagnostics
                .address
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid_port {
                bail!(
                    "diagnostics.address '{}' must be host:port",
                    self.diagnostics.address
                );
            }
        }

        Ok(())
    }
}

const MAX_DEBOUNCE_MS: u64 = 5_000;

// Default value functions
fn default_debounce_ms() -> u64 { 100 }
fn default_display_prefix() -> String { "Komplete Kontrol".to_string() }
fn default_parameter_tag() -> String { "NIKB".to_string() }
fn default_plugin_classes() -> Vec<String> {
    vec!["PluginDevice".to_string(), "AuPluginDevice".to_string()]
}
fn default_diagnostics_address() -> String { "127.0.0.1:60090".to_string() }
fn default_diagnostics_timeout_ms() -> u64 { 250 }
