//! Virtual device descriptors.
//!
//! A [`DeviceDescriptor`] is everything the peer needs to instantiate a
//! device remotely: a display name, a packed BCD-style version and three
//! opaque blobs (HID report descriptor, physical descriptor, strings table).
//! The blobs are never interpreted by this crate.

use std::fmt;

/// Device version packed as two hex-digit pairs: `0x0100` is "1.00".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceVersion(pub u16);

impl DeviceVersion {
    /// Builds a version from its major and minor parts.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self(((major as u16) << 8) | minor as u16)
    }

    pub fn major(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn minor(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl fmt::Display for DeviceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}.{:02x}", self.major(), self.minor())
    }
}

impl From<u16> for DeviceVersion {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

/// Describes one virtual device to the client.
///
/// Descriptors are immutable once handed to the client; the client keeps
/// them in a shared read-only slice for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceDescriptor {
    /// Product name.  Truncated to 64 bytes on the wire.
    pub name: String,
    /// Product version.
    pub version: DeviceVersion,
    /// HID report descriptor.
    pub report_descriptor: Vec<u8>,
    /// HID physical descriptor (usually empty).
    pub physical_descriptor: Vec<u8>,
    /// Strings table (usually empty).
    pub strings: Vec<u8>,
}

impl DeviceDescriptor {
    /// Creates a descriptor with only a report descriptor, which is what
    /// the vast majority of devices need.
    pub fn new(
        name: impl Into<String>,
        version: u16,
        report_descriptor: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            version: DeviceVersion(version),
            report_descriptor: report_descriptor.into(),
            physical_descriptor: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub fn with_physical_descriptor(mut self, physical: impl Into<Vec<u8>>) -> Self {
        self.physical_descriptor = physical.into();
        self
    }

    pub fn with_strings(mut self, strings: impl Into<Vec<u8>>) -> Self {
        self.strings = strings.into();
        self
    }
}
