//! Binary codec for encoding and decoding HID-Link protocol messages.
//!
//! Wire format (the opcode is carried separately by the transport):
//! ```text
//! [device_id:4][report_id:4][body:N]
//! ```
//! All multi-byte integers are big-endian.  Unused header fields are zero.
//!
//! `DEVICE_NEW` bodies are a fixed 112-byte record followed by the blob
//! section:
//! ```text
//! [name:64][serial:32][zero:2][version:2]
//! [desc_off:2][desc_size:2][phys_off:2][phys_size:2][str_off:2][str_size:2]
//! [descriptor | pad to 4][physical | pad to 4][strings][slack:8]
//! ```
//! Offsets are relative to the start of the record.  Sizes are the true
//! unpadded lengths; only the offset of the following blob accounts for
//! the padding.

use crate::domain::device::{DeviceDescriptor, DeviceVersion};
use crate::protocol::messages::{
    BlobLayout, DeviceAnnouncement, HidMessage, MessageHeader, Opcode, ReportMessage,
    BLOB_ALIGNMENT, DEVICE_BLOB_SLACK, DEVICE_NAME_LEN, DEVICE_RECORD_SIZE, DEVICE_SERIAL_LEN,
    HEADER_SIZE,
};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The opcode is not one of the nine defined values.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    /// A descriptor blob is too large for the 16-bit offset/size table.
    #[error("{field} blob of {len} bytes does not fit the 16-bit offset table")]
    BlobTooLarge { field: &'static str, len: usize },

    /// The payload could not be parsed (offset out of bounds, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes any [`HidMessage`] into its payload bytes (header included).
///
/// The opcode is not part of the payload: pass `msg.opcode()` to the
/// transport alongside the returned bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::BlobTooLarge`] when a `DeviceNew` announcement
/// cannot be described by 16-bit offsets.
///
/// # Examples
///
/// ```rust
/// use hidlink_core::protocol::{decode_message, encode_message};
/// use hidlink_core::protocol::messages::{HidMessage, Opcode};
///
/// let msg = HidMessage::Grab { device_id: 1, report_id: 2 };
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(bytes, [0, 0, 0, 1, 0, 0, 0, 2]);
/// assert_eq!(decode_message(Opcode::Grab as u8, &bytes).unwrap(), msg);
/// ```
pub fn encode_message(msg: &HidMessage) -> Result<Vec<u8>, ProtocolError> {
    let bytes = match msg {
        HidMessage::DeviceNew {
            device_id,
            announcement,
        } => encode_announcement(
            *device_id,
            announcement.name.as_bytes(),
            &announcement.serial,
            announcement.version,
            [
                &announcement.report_descriptor,
                &announcement.physical_descriptor,
                &announcement.strings,
            ],
        )?,
        HidMessage::DeviceDropped { device_id }
        | HidMessage::DeviceCreated { device_id }
        | HidMessage::DeviceClose { device_id } => encode_header_only(*device_id, 0),
        HidMessage::Feature(r) | HidMessage::Data(r) => {
            encode_report(r.device_id, r.report_id, &r.payload)
        }
        HidMessage::Grab {
            device_id,
            report_id,
        }
        | HidMessage::Release {
            device_id,
            report_id,
        }
        | HidMessage::FeatureSollicit {
            device_id,
            report_id,
        } => encode_header_only(*device_id, u32::from(*report_id)),
    };
    Ok(bytes)
}

/// Encodes a `DEVICE_NEW` announcement for `desc` as device `device_id`.
///
/// The returned buffer is exactly
/// `HEADER_SIZE + DEVICE_RECORD_SIZE + d + p + s + DEVICE_BLOB_SLACK` bytes
/// long, zero filled wherever no field or blob is written.
///
/// # Errors
///
/// Returns [`ProtocolError::BlobTooLarge`] if an offset or size exceeds
/// `u16::MAX`.
pub fn encode_device_new(
    device_id: u32,
    desc: &DeviceDescriptor,
) -> Result<Vec<u8>, ProtocolError> {
    encode_announcement(
        device_id,
        desc.name.as_bytes(),
        &[0u8; DEVICE_SERIAL_LEN],
        desc.version,
        [
            &desc.report_descriptor,
            &desc.physical_descriptor,
            &desc.strings,
        ],
    )
}

/// Encodes a `DEVICE_DROPPED` notice: header only.
pub fn encode_device_dropped(device_id: u32) -> Vec<u8> {
    encode_header_only(device_id, 0)
}

/// Encodes a `FEATURE` or `DATA` report: header immediately followed by
/// the raw report bytes.
pub fn encode_report(device_id: u32, report_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, device_id, u32::from(report_id));
    buf.extend_from_slice(payload);
    buf
}

/// Reads the 8-byte header at the start of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if `bytes` is shorter than
/// [`HEADER_SIZE`].
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, ProtocolError> {
    require_len(bytes, HEADER_SIZE)?;
    Ok(MessageHeader {
        device_id: read_u32(bytes, 0),
        report_id: read_u32(bytes, 4),
    })
}

/// Decodes one payload received with `opcode`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the opcode is unknown or the bytes are
/// malformed.
pub fn decode_message(opcode: u8, bytes: &[u8]) -> Result<HidMessage, ProtocolError> {
    let opcode = Opcode::try_from(opcode).map_err(|_| ProtocolError::UnknownOpcode(opcode))?;
    let header = decode_header(bytes)?;
    let device_id = header.device_id;

    let msg = match opcode {
        Opcode::DeviceNew => HidMessage::DeviceNew {
            device_id,
            announcement: decode_announcement(&bytes[HEADER_SIZE..])?,
        },
        Opcode::DeviceDropped => HidMessage::DeviceDropped { device_id },
        Opcode::DeviceCreated => HidMessage::DeviceCreated { device_id },
        Opcode::DeviceClose => HidMessage::DeviceClose { device_id },
        Opcode::Feature => HidMessage::Feature(ReportMessage {
            device_id,
            report_id: narrow_report_id(header.report_id),
            payload: bytes[HEADER_SIZE..].to_vec(),
        }),
        Opcode::Data => HidMessage::Data(ReportMessage {
            device_id,
            report_id: narrow_report_id(header.report_id),
            payload: bytes[HEADER_SIZE..].to_vec(),
        }),
        Opcode::Grab => HidMessage::Grab {
            device_id,
            report_id: narrow_report_id(header.report_id),
        },
        Opcode::Release => HidMessage::Release {
            device_id,
            report_id: narrow_report_id(header.report_id),
        },
        Opcode::FeatureSollicit => HidMessage::FeatureSollicit {
            device_id,
            report_id: narrow_report_id(header.report_id),
        },
    };
    Ok(msg)
}

/// Rounds `len` up to the next multiple of [`BLOB_ALIGNMENT`].
pub fn align_blob(len: usize) -> usize {
    (len + BLOB_ALIGNMENT - 1) & !(BLOB_ALIGNMENT - 1)
}

// ── Announcement encoding ─────────────────────────────────────────────────────

fn encode_announcement(
    device_id: u32,
    name: &[u8],
    serial: &[u8; DEVICE_SERIAL_LEN],
    version: DeviceVersion,
    [descriptor, physical, strings]: [&[u8]; 3],
) -> Result<Vec<u8>, ProtocolError> {
    let descriptor_offset = DEVICE_RECORD_SIZE;
    let physical_offset = descriptor_offset + align_blob(descriptor.len());
    let strings_offset = physical_offset + align_blob(physical.len());

    let layout = BlobLayout {
        descriptor_offset: to_u16("descriptor", descriptor_offset)?,
        descriptor_size: to_u16("descriptor", descriptor.len())?,
        physical_offset: to_u16("physical", physical_offset)?,
        physical_size: to_u16("physical", physical.len())?,
        strings_offset: to_u16("strings", strings_offset)?,
        strings_size: to_u16("strings", strings.len())?,
    };

    let blob_size = descriptor.len() + physical.len() + strings.len() + DEVICE_BLOB_SLACK;
    let mut buf = vec![0u8; HEADER_SIZE + DEVICE_RECORD_SIZE + blob_size];

    buf[0..4].copy_from_slice(&device_id.to_be_bytes());
    // report_id (4..8) stays zero

    let record = &mut buf[HEADER_SIZE..];

    // strncpy semantics: stop at the first NUL, no terminator when full
    let name_len = name
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(name.len())
        .min(DEVICE_NAME_LEN);
    record[..name_len].copy_from_slice(&name[..name_len]);
    record[DEVICE_NAME_LEN..DEVICE_NAME_LEN + DEVICE_SERIAL_LEN].copy_from_slice(serial);

    let mut off = DEVICE_NAME_LEN + DEVICE_SERIAL_LEN;
    // zero field (2 bytes) stays zero
    off += 2;
    for field in [
        version.0,
        layout.descriptor_offset,
        layout.descriptor_size,
        layout.physical_offset,
        layout.physical_size,
        layout.strings_offset,
        layout.strings_size,
    ] {
        record[off..off + 2].copy_from_slice(&field.to_be_bytes());
        off += 2;
    }
    debug_assert_eq!(off, DEVICE_RECORD_SIZE);

    for (offset, blob) in [
        (descriptor_offset, descriptor),
        (physical_offset, physical),
        (strings_offset, strings),
    ] {
        record[offset..offset + blob.len()].copy_from_slice(blob);
    }

    Ok(buf)
}

// ── Announcement decoding ─────────────────────────────────────────────────────

fn decode_announcement(record: &[u8]) -> Result<DeviceAnnouncement, ProtocolError> {
    if record.len() < DEVICE_RECORD_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE + DEVICE_RECORD_SIZE,
            available: HEADER_SIZE + record.len(),
        });
    }

    let name_field = &record[..DEVICE_NAME_LEN];
    let name_len = name_field
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(DEVICE_NAME_LEN);
    let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

    let mut serial = [0u8; DEVICE_SERIAL_LEN];
    serial.copy_from_slice(&record[DEVICE_NAME_LEN..DEVICE_NAME_LEN + DEVICE_SERIAL_LEN]);

    let table = DEVICE_NAME_LEN + DEVICE_SERIAL_LEN;
    let zero = read_u16(record, table);
    if zero != 0 {
        return Err(ProtocolError::MalformedPayload(format!(
            "reserved announcement field is {zero:#06x}, expected 0"
        )));
    }
    let version = DeviceVersion(read_u16(record, table + 2));
    let layout = BlobLayout {
        descriptor_offset: read_u16(record, table + 4),
        descriptor_size: read_u16(record, table + 6),
        physical_offset: read_u16(record, table + 8),
        physical_size: read_u16(record, table + 10),
        strings_offset: read_u16(record, table + 12),
        strings_size: read_u16(record, table + 14),
    };

    Ok(DeviceAnnouncement {
        name,
        serial,
        version,
        report_descriptor: read_blob(
            record,
            layout.descriptor_offset,
            layout.descriptor_size,
            "descriptor",
        )?,
        physical_descriptor: read_blob(
            record,
            layout.physical_offset,
            layout.physical_size,
            "physical",
        )?,
        strings: read_blob(record, layout.strings_offset, layout.strings_size, "strings")?,
        layout,
    })
}

fn read_blob(record: &[u8], offset: u16, size: u16, field: &str) -> Result<Vec<u8>, ProtocolError> {
    let start = offset as usize;
    let end = start + size as usize;
    if size > 0 && start < DEVICE_RECORD_SIZE {
        return Err(ProtocolError::MalformedPayload(format!(
            "{field} blob offset {start} overlaps the fixed record"
        )));
    }
    if end > record.len() {
        return Err(ProtocolError::MalformedPayload(format!(
            "{field} blob {start}..{end} exceeds record of {} bytes",
            record.len()
        )));
    }
    Ok(record[start..end].to_vec())
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn encode_header_only(device_id: u32, report_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE);
    write_header(&mut buf, device_id, report_id);
    buf
}

fn write_header(buf: &mut Vec<u8>, device_id: u32, report_id: u32) {
    buf.extend_from_slice(&device_id.to_be_bytes());
    buf.extend_from_slice(&report_id.to_be_bytes());
}

/// Report IDs travel as 32 bits but HID report IDs are one byte; only the
/// low byte is kept.
pub(crate) fn narrow_report_id(report_id: u32) -> u8 {
    if report_id > u32::from(u8::MAX) {
        debug!(report_id, "report id wider than a byte, keeping low byte");
    }
    report_id as u8
}

fn to_u16(field: &'static str, value: usize) -> Result<u16, ProtocolError> {
    u16::try_from(value).map_err(|_| ProtocolError::BlobTooLarge { field, len: value })
}

fn require_len(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::InsufficientData {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
