//! Binary framing of section lists.
//!
//! Every section is written as a 16-byte big-endian header followed by the
//! content produced by its coder. One transport frame carries any number of
//! sections back to back.
//!
//! # Frame Layout
//!
//! | Bytes | Field | Meaning |
//! |-------|-------|---------|
//! | 0..4 | total length | content length + 16 |
//! | 4..6 | protocol version | [`PROTOCOL_VERSION`] |
//! | 6 | reserved | 0 |
//! | 7 | control flag | 0x01 / 0x00 |
//! | 8..12 | opCode | integer |
//! | 12..15 | reserved | 0 |
//! | 15 | binary flag | 0x01 / 0x00 |
//!
//! Failures are contained: an encode failure drops that section, an
//! undecodable or unknown section is skipped, a malformed length abandons
//! the rest of the buffer. None of them surface as errors.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, warn};

use super::section::{Section, SectionCoder, SectionHeader, find_coder};
use super::{HEADER_LEN, PROTOCOL_VERSION};

// ============================================================================
// Encode
// ============================================================================

/// Encodes `sections` into one buffer, in input order.
///
/// A section whose coder rejects its payload is logged and contributes no
/// bytes.
#[must_use]
pub fn encode_sections(sections: &[Section]) -> Vec<u8> {
    let mut buffer = Vec::new();

    for section in sections {
        let coder = section.coder();
        let content = match coder.encode(section.payload()) {
            Ok(content) => content,
            Err(e) => {
                warn!(coder = coder.name, error = %e, "Dropping section that failed to encode");
                continue;
            }
        };

        let Ok(total) = u32::try_from(content.len() + HEADER_LEN) else {
            warn!(coder = coder.name, len = content.len(), "Dropping oversized section");
            continue;
        };

        write_header(&mut buffer, total, &coder.header);
        buffer.extend_from_slice(&content);
    }

    buffer
}

/// Appends one 16-byte header.
fn write_header(buffer: &mut Vec<u8>, total: u32, header: &SectionHeader) {
    buffer.extend_from_slice(&total.to_be_bytes());
    buffer.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buffer.push(0);
    buffer.push(u8::from(header.control));
    buffer.extend_from_slice(&header.op_code.to_be_bytes());
    buffer.extend_from_slice(&[0; 3]);
    buffer.push(u8::from(header.binary));
}

// ============================================================================
// Decode
// ============================================================================

/// Decodes every recognizable section in `buffer`, in wire order.
#[must_use]
pub fn decode_sections(registry: &[SectionCoder], buffer: &[u8]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut offset = 0;

    while buffer.len() - offset >= HEADER_LEN {
        let frame = &buffer[offset..];
        let total = read_u32(frame, 0) as usize;

        if total < HEADER_LEN || total > frame.len() {
            warn!(
                offset,
                total,
                remaining = frame.len(),
                "Malformed section length, abandoning buffer"
            );
            break;
        }

        let version = read_u16(frame, 4);
        if version != PROTOCOL_VERSION {
            debug!(offset, version, "Skipping section with foreign protocol version");
            offset += total;
            continue;
        }

        let header = SectionHeader {
            control: frame[7] != 0,
            op_code: read_u32(frame, 8),
            binary: frame[15] != 0,
        };
        let content = &frame[HEADER_LEN..total];

        match find_coder(registry, &header) {
            Some(coder) => match coder.decode(content) {
                Ok(payload) => sections.push(Section::new(*coder, payload)),
                Err(e) => {
                    warn!(offset, coder = coder.name, error = %e, "Dropping undecodable section");
                }
            },
            None => {
                warn!(
                    offset,
                    op_code = header.op_code,
                    control = header.control,
                    binary = header.binary,
                    "No coder registered for section"
                );
            }
        }

        offset += total;
    }

    sections
}

/// Reads a big-endian `u16` at `at`. Caller guarantees bounds.
#[inline]
fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Reads a big-endian `u32` at `at`. Caller guarantees bounds.
#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

// ============================================================================
// Tests
// ============================================================================
