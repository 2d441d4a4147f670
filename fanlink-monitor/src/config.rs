//! Configuration for the fan monitor.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fanlink_core::{ConnectionConfig, ConnectionInfo, DEFAULT_PORT, FanError};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Connection timings shared by every device.
    pub connection: ConnectionSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Fans to connect to.
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// TCP port of the fan.
    pub port: u16,
    /// Seconds between keepalive frames.
    pub keepalive_secs: u64,
    /// Seconds to wait before reconnecting after a socket error.
    pub reconnect_delay_secs: u64,
    /// Seconds `--probe` waits for each fan.
    pub probe_timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive, used when `RUST_LOG` is unset.
    pub level: String,
}

/// One fan. Only the address is required to connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            keepalive_secs: 60,
            reconnect_delay_secs: 2,
            probe_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────

impl ConnectionSettings {
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            keepalive_interval: Duration::from_secs(self.keepalive_secs.max(1)),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
        }
    }
}

impl DeviceConfig {
    /// Name for log lines and output: the configured name, else the MAC,
    /// else the address.
    pub fn label(&self) -> String {
        self.name
            .as_ref()
            .or(self.mac_address.as_ref())
            .or(self.ip_address.as_ref())
            .cloned()
            .unwrap_or_else(|| "unnamed fan".into())
    }

    pub fn connection_info(&self, port: u16) -> Result<ConnectionInfo, FanError> {
        match self.ip_address.as_deref().map(str::trim) {
            Some(ip) if !ip.is_empty() => Ok(ConnectionInfo::new(ip, port)),
            _ => Err(FanError::ConfigurationMissing(format!(
                "{} has no ip_address",
                self.label()
            ))),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl MonitorConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The default configuration with one example device, for bootstrapping.
    pub fn example() -> Self {
        Self {
            devices: vec![DeviceConfig {
                name: Some("Living Room".into()),
                ip_address: Some("192.168.1.50".into()),
                mac_address: Some("20:f8:5e:00:00:00".into()),
            }],
            ..Self::default()
        }
    }

    /// Write the example configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::example()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_serializes() {
        let text = toml::to_string_pretty(&MonitorConfig::example()).unwrap();
        assert!(text.contains("keepalive_secs"));
        assert!(text.contains("[[devices]]"));
        assert!(text.contains("192.168.1.50"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&MonitorConfig::example()).unwrap();
        let parsed: MonitorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.connection.port, 31415);
        assert_eq!(parsed.devices, MonitorConfig::example().devices);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: MonitorConfig = toml::from_str(
            r#"
            [[devices]]
            ip_address = "10.0.0.9"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.connection.reconnect_delay_secs, 2);
        assert_eq!(parsed.logging.level, "info");
        assert_eq!(parsed.devices[0].label(), "10.0.0.9");
    }

    #[test]
    fn device_without_address_is_configuration_missing() {
        let device = DeviceConfig {
            name: Some("Porch".into()),
            ..Default::default()
        };
        let err = device.connection_info(DEFAULT_PORT).unwrap_err();
        assert!(matches!(err, FanError::ConfigurationMissing(ref m) if m.contains("Porch")));

        let blank = DeviceConfig {
            ip_address: Some("  ".into()),
            ..Default::default()
        };
        assert!(blank.connection_info(DEFAULT_PORT).is_err());
    }

    #[test]
    fn settings_convert_to_core_config() {
        let config = ConnectionSettings::default().to_connection_config();
        assert_eq!(config, ConnectionConfig::default());
    }

    #[test]
    fn written_default_loads_back() {
        let path = std::env::temp_dir().join(format!("fanlink-{}.toml", std::process::id()));
        MonitorConfig::write_default(&path).unwrap();
        let cfg = MonitorConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.devices, MonitorConfig::example().devices);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = MonitorConfig::load(Path::new("/nonexistent/fanlink-monitor.toml"));
        assert!(cfg.devices.is_empty());
    }
}
