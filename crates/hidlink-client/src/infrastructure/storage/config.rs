//! TOML-based configuration for the client binary.
//!
//! Read from `--config <path>` or from the platform-appropriate file:
//! - Windows:  `%APPDATA%\hidlink\client.toml`
//! - Linux:    `$XDG_CONFIG_HOME/hidlink/client.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/hidlink/client.toml`
//!
//! ```toml
//! [client]
//! log_level = "info"
//! reconnect_interval_ms = 1000
//!
//! [server]
//! host = "127.0.0.1"
//! port = 24322
//! ip_flags = 0
//!
//! [[devices]]
//! name = "Remote"
//! version = 0x0100
//! report_descriptor = "05010906a101..."
//! enabled = true
//! ```
//!
//! Every section and field is optional.  Descriptor blobs are hex strings;
//! whitespace inside them is ignored so long descriptors can be wrapped.
//! With no `[[devices]]` at all, a built-in Unicode keyboard / consumer /
//! system-control device is declared.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hidlink_core::DeviceDescriptor;
use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A `[[devices]]` entry cannot be turned into a descriptor.
    #[error("invalid device {name:?}: {reason}")]
    InvalidDevice { name: String, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Runtime behaviour.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay between TCP connection attempts.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// The peer to connect to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address family restriction, see `IP_FLAG_IPV4` / `IP_FLAG_IPV6`.
    #[serde(default)]
    pub ip_flags: u32,
}

/// One declared device.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeviceEntry {
    pub name: String,
    #[serde(default = "default_device_version")]
    pub version: u16,
    /// Hex-encoded HID report descriptor.
    pub report_descriptor: String,
    #[serde(default)]
    pub physical_descriptor: String,
    #[serde(default)]
    pub strings: String,
    /// Whether the binary enables the device at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_reconnect_interval_ms() -> u64 {
    1000
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    24322
}
fn default_device_version() -> u16 {
    0x0100
}
fn default_true() -> bool {
    true
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ip_flags: 0,
        }
    }
}

// ── Built-in device ───────────────────────────────────────────────────────────

/// Report IDs: 1 = Unicode code point (32 bit), 2 = keyboard usage (8 bit),
/// 3 = consumer control (16 bit), 4 = system control bits.
const UNICODE_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, 0x09, 0x06, // Usage Page (Desktop), Usage (Keyboard)
    0xA1, 0x01, 0x85, 0x01, // Collection (Application), Report ID (1)
    0x05, 0x10, 0x08, // Usage Page (Unicode), Usage (0)
    0x95, 0x01, 0x75, 0x20, // Report Count (1), Report Size (32)
    0x14, 0x27, 0xFF, 0xFF, 0xFF, 0x00, // Logical Min (0), Logical Max (2^24-1)
    0x81, 0x62, 0xC0, // Input (Var, No Pref, No Null), End Collection
    0xA1, 0x01, 0x85, 0x02, // Collection (Application), Report ID (2)
    0x95, 0x01, 0x75, 0x08, // Report Count (1), Report Size (8)
    0x15, 0x00, 0x26, 0xFF, 0x00, // Logical Min (0), Logical Max (255)
    0x05, 0x07, 0x19, 0x00, 0x2A, 0xFF, 0x00, // Usage Page (Keyboard), Usage 0..FF
    0x80, 0xC0, // Input, End Collection
    0x05, 0x0C, 0x09, 0x01, // Usage Page (Consumer), Usage (Consumer Control)
    0xA1, 0x01, 0x85, 0x03, // Collection (Application), Report ID (3)
    0x95, 0x01, 0x75, 0x10, // Report Count (1), Report Size (16)
    0x19, 0x00, 0x2A, 0x8C, 0x02, // Usage 0..AC Send
    0x15, 0x00, 0x26, 0x8C, 0x02, // Logical Min (0), Logical Max (652)
    0x80, 0xC0, // Input, End Collection
    0x05, 0x01, 0x0A, 0x80, 0x00, // Usage Page (Desktop), Usage (System Control)
    0xA1, 0x01, 0x85, 0x04, // Collection (Application), Report ID (4)
    0x75, 0x01, 0x95, 0x04, // Report Size (1), Report Count (4)
    0x1A, 0x81, 0x00, 0x2A, 0x84, 0x00, // Usage Power Down..Context Menu
    0x81, 0x02, // Input (Var)
    0x75, 0x01, 0x95, 0x04, 0x81, 0x01, // 4 bits padding
    0xC0, // End Collection
];

/// The device declared when the configuration lists none.
pub fn builtin_device() -> DeviceDescriptor {
    DeviceDescriptor::new("Unicode", 0x0100, UNICODE_REPORT_DESCRIPTOR)
}

// ── Conversion ────────────────────────────────────────────────────────────────

fn decode_hex(device: &str, field: &str, text: &str) -> Result<Vec<u8>, ConfigError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|e| ConfigError::InvalidDevice {
        name: device.to_string(),
        reason: format!("{field}: {e}"),
    })
}

impl DeviceEntry {
    /// Decodes the hex blobs into a [`DeviceDescriptor`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidDevice`] for malformed hex or an empty report
    /// descriptor.
    pub fn to_descriptor(&self) -> Result<DeviceDescriptor, ConfigError> {
        let report = decode_hex(&self.name, "report_descriptor", &self.report_descriptor)?;
        if report.is_empty() {
            return Err(ConfigError::InvalidDevice {
                name: self.name.clone(),
                reason: "report_descriptor is empty".to_string(),
            });
        }
        Ok(DeviceDescriptor::new(self.name.clone(), self.version, report)
            .with_physical_descriptor(decode_hex(
                &self.name,
                "physical_descriptor",
                &self.physical_descriptor,
            )?)
            .with_strings(decode_hex(&self.name, "strings", &self.strings)?))
    }
}

impl ClientConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.client.reconnect_interval_ms)
    }

    /// Descriptors in declaration order, each with its startup enable flag.
    /// Falls back to [`builtin_device`] (enabled) when none are configured.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError::InvalidDevice`] encountered.
    pub fn devices(&self) -> Result<Vec<(DeviceDescriptor, bool)>, ConfigError> {
        if self.devices.is_empty() {
            return Ok(vec![(builtin_device(), true)]);
        }
        self.devices
            .iter()
            .map(|entry| Ok((entry.to_descriptor()?, entry.enabled)))
            .collect()
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path, if the platform has a config dir.
pub fn config_file_path() -> Option<PathBuf> {
    platform_config_dir().map(|dir| dir.join("client.toml"))
}

/// Parses configuration text.
///
/// # Errors
///
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the configuration.
///
/// An explicit `path` must exist.  Without one, the platform file is read
/// if present and [`ClientConfig::default`] is returned otherwise.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors, [`ConfigError::Parse`] if
/// the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match config_file_path() {
            Some(p) => (p, false),
            None => return Ok(ClientConfig::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(ClientConfig::default())
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("hidlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("hidlink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("hidlink"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
