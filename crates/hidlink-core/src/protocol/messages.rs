//! All HID-Link protocol message types.
//!
//! The opcode travels out-of-band (the transport tags each packet with it);
//! the payload always starts with an 8-byte [`MessageHeader`].

use crate::domain::device::DeviceVersion;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the common `device_id` + `report_id` header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Size of the fixed name field of a device announcement.
pub const DEVICE_NAME_LEN: usize = 64;

/// Size of the reserved serial-number field of a device announcement.
pub const DEVICE_SERIAL_LEN: usize = 32;

/// Size of the fixed announcement record that follows the header in
/// `DEVICE_NEW`: name + serial + zero + version + three (offset, size) pairs.
pub const DEVICE_RECORD_SIZE: usize = DEVICE_NAME_LEN + DEVICE_SERIAL_LEN + 2 + 2 + 3 * 4;

/// Slack appended after the blob section of `DEVICE_NEW`, enough to absorb
/// the alignment padding of the first two blobs.
pub const DEVICE_BLOB_SLACK: usize = 8;

/// Blob alignment inside the announcement's variable section.
pub const BLOB_ALIGNMENT: usize = 4;

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// Message opcodes carried by the transport alongside each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// client → server: announce a device.
    DeviceNew = 0,
    /// client → server: a device disappeared.
    DeviceDropped = 1,
    /// server → client: the announced device was instantiated.
    DeviceCreated = 2,
    /// server → client: the device was closed; all its grabs are void.
    DeviceClose = 3,
    /// bidirectional: feature report.
    Feature = 4,
    /// bidirectional: input report (client → server) or output report
    /// (server → client).
    Data = 5,
    /// server → client: the peer takes ownership of a report stream.
    Grab = 6,
    /// server → client: the peer gives up a report stream.
    Release = 7,
    /// server → client: the peer asks for a feature report.
    FeatureSollicit = 8,
}

impl Opcode {
    /// Whether a well-behaved server may send this opcode to a client.
    pub fn is_server_to_client(&self) -> bool {
        !matches!(self, Opcode::DeviceNew | Opcode::DeviceDropped)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(Opcode::DeviceNew),
            1 => Ok(Opcode::DeviceDropped),
            2 => Ok(Opcode::DeviceCreated),
            3 => Ok(Opcode::DeviceClose),
            4 => Ok(Opcode::Feature),
            5 => Ok(Opcode::Data),
            6 => Ok(Opcode::Grab),
            7 => Ok(Opcode::Release),
            8 => Ok(Opcode::FeatureSollicit),
            _ => Err(()),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

// ── Common message header ─────────────────────────────────────────────────────

/// 8-byte header at the start of every payload.  Unused fields are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub device_id: u32,
    pub report_id: u32,
}

impl MessageHeader {
    pub fn new(device_id: u32, report_id: u32) -> Self {
        Self {
            device_id,
            report_id,
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// Decoded `DEVICE_NEW` record with its blobs extracted.
///
/// The client never receives this message; the decoder exists for peers
/// and for verifying the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAnnouncement {
    /// Name with trailing zero padding removed.
    pub name: String,
    /// Reserved serial field, zero in everything this crate produces.
    pub serial: [u8; DEVICE_SERIAL_LEN],
    pub version: DeviceVersion,
    pub report_descriptor: Vec<u8>,
    pub physical_descriptor: Vec<u8>,
    pub strings: Vec<u8>,
    /// Raw offset/size table as found on the wire, in record order:
    /// descriptor, physical, strings.
    pub layout: BlobLayout,
}

/// Offset/size table of a device announcement.  Offsets are relative to
/// the start of the fixed record; sizes are the unpadded blob lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlobLayout {
    pub descriptor_offset: u16,
    pub descriptor_size: u16,
    pub physical_offset: u16,
    pub physical_size: u16,
    pub strings_offset: u16,
    pub strings_size: u16,
}

/// A report carried by `FEATURE` or `DATA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMessage {
    pub device_id: u32,
    pub report_id: u8,
    /// Opaque report bytes, no padding.
    pub payload: Vec<u8>,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All HID-Link messages, discriminated by opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidMessage {
    DeviceNew {
        device_id: u32,
        announcement: DeviceAnnouncement,
    },
    DeviceDropped {
        device_id: u32,
    },
    DeviceCreated {
        device_id: u32,
    },
    DeviceClose {
        device_id: u32,
    },
    Feature(ReportMessage),
    Data(ReportMessage),
    Grab {
        device_id: u32,
        report_id: u8,
    },
    Release {
        device_id: u32,
        report_id: u8,
    },
    FeatureSollicit {
        device_id: u32,
        report_id: u8,
    },
}

impl HidMessage {
    /// Returns the [`Opcode`] for this message.
    pub fn opcode(&self) -> Opcode {
        match self {
            HidMessage::DeviceNew { .. } => Opcode::DeviceNew,
            HidMessage::DeviceDropped { .. } => Opcode::DeviceDropped,
            HidMessage::DeviceCreated { .. } => Opcode::DeviceCreated,
            HidMessage::DeviceClose { .. } => Opcode::DeviceClose,
            HidMessage::Feature(_) => Opcode::Feature,
            HidMessage::Data(_) => Opcode::Data,
            HidMessage::Grab { .. } => Opcode::Grab,
            HidMessage::Release { .. } => Opcode::Release,
            HidMessage::FeatureSollicit { .. } => Opcode::FeatureSollicit,
        }
    }

    /// The device every message refers to.
    pub fn device_id(&self) -> u32 {
        match self {
            HidMessage::DeviceNew { device_id, .. }
            | HidMessage::DeviceDropped { device_id }
            | HidMessage::DeviceCreated { device_id }
            | HidMessage::DeviceClose { device_id }
            | HidMessage::Grab { device_id, .. }
            | HidMessage::Release { device_id, .. }
            | HidMessage::FeatureSollicit { device_id, .. } => *device_id,
            HidMessage::Feature(r) | HidMessage::Data(r) => r.device_id,
        }
    }
}
