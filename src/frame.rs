//! Wire frame codec for the ThingMagic serial reader protocol.
//!
//! # Frame format
//!
//! ```text
//! command:  FF <len> <op> <payload...>                <crc16>   (len + 5 bytes)
//! reply:    FF <len> <op> <status hi> <status lo> <payload...> <crc16>   (len + 7 bytes)
//! ```
//!
//! - Delimiter: a single `0xFF` byte
//! - `len`: payload byte count, excluding the two status bytes on replies
//! - `op`: command/response opcode
//! - `status`: 16-bit big-endian result code, present on replies only
//! - `crc16`: big-endian CRC over everything between delimiter and CRC

/// Every frame on the wire starts with this byte.
pub const DELIMITER: u8 = 0xFF;

/// Bytes in a reply besides the payload: delimiter, length, opcode,
/// two status bytes and the two CRC bytes.
pub const FRAME_OVERHEAD: usize = 7;

/// Largest payload a length byte can declare while keeping the whole
/// reply within 255 bytes.
pub const MAX_PAYLOAD_LEN: usize = 255 - FRAME_OVERHEAD;

const CRC_TABLE: [u16; 16] = [
    0x0000, 0x1021, 0x2042, 0x3063, 0x4084, 0x50A5, 0x60C6, 0x70E7, 0x8108, 0x9129, 0xA14A, 0xB16B,
    0xC18C, 0xD1AD, 0xE1CE, 0xF1EF,
];

/// CRC-16 (CCITT variant) processed one nibble at a time, high nibble first,
/// initial value 0xFFFF. Both the encoder and the validator run it over the
/// bytes between the delimiter and the trailing CRC.
pub(crate) fn checksum(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in bytes {
        for nibble in [byte >> 4, byte & 0x0F] {
            crc = ((crc << 4) | nibble as u16) ^ CRC_TABLE[(crc >> 12) as usize];
        }
    }
    crc
}

/// Errors raised while validating an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The first byte is not the 0xFF delimiter; the stream is desynchronized.
    #[error("bad delimiter: expected 0xFF, found 0x{found:02X}")]
    BadDelimiter { found: u8 },

    /// The declared payload length disagrees with the actual buffer size.
    #[error("length mismatch: header declares a {declared}-byte frame, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The trailing CRC does not match the checksummed range.
    #[error("CRC mismatch: frame carries 0x{received:04X}, computed 0x{computed:04X}")]
    CrcMismatch { received: u16, computed: u16 },
}

/// Encode a command frame for transmission.
///
/// The payload may be empty. Commands use the short (`len + 5`) layout;
/// only the reader's replies carry status bytes.
pub fn encode_command(opcode: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);

    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(DELIMITER);
    frame.push(payload.len() as u8);
    frame.push(opcode);
    frame.extend_from_slice(payload);
    let crc = checksum(&frame[1..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// Encode a reply-shaped frame (the `len + 7` layout with a status word).
///
/// The driver never sends these; they exist for device simulators and for
/// mock transports in tests, which need replies with valid checksums.
pub fn encode_reply(opcode: u8, status: u16, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.push(DELIMITER);
    frame.push(payload.len() as u8);
    frame.push(opcode);
    frame.extend_from_slice(&status.to_be_bytes());
    frame.extend_from_slice(payload);
    let crc = checksum(&frame[1..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame
}

/// A validated inbound frame.
///
/// Construction goes through [`Frame::parse`], so holding a `Frame` means the
/// delimiter, declared length and CRC all checked out. Accessors expose the
/// decoded fields; [`Frame::as_bytes`] exposes the raw buffer for decoders
/// that work with fixed offsets from the frame start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Vec<u8>,
}

impl Frame {
    /// Validate a candidate frame. Checks run in order: delimiter, declared
    /// length against the buffer, CRC. Runs on every inbound frame, replies
    /// to commands and continuous-read traffic alike.
    pub fn parse(raw: &[u8]) -> Result<Frame, FrameError> {
        match raw.first() {
            Some(&DELIMITER) => {}
            other => {
                return Err(FrameError::BadDelimiter {
                    found: other.copied().unwrap_or(0),
                });
            }
        }

        let declared = match raw.get(1) {
            Some(&len) => len as usize + FRAME_OVERHEAD,
            None => FRAME_OVERHEAD,
        };
        if raw.len() != declared {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: raw.len(),
            });
        }

        let computed = checksum(&raw[1..raw.len() - 2]);
        let received = u16::from_be_bytes([raw[raw.len() - 2], raw[raw.len() - 1]]);
        if computed != received {
            return Err(FrameError::CrcMismatch { received, computed });
        }

        Ok(Frame { raw: raw.to_vec() })
    }

    pub fn opcode(&self) -> u8 {
        self.raw[2]
    }

    /// The 16-bit status word. Meaningful on tag-stream frames, where the
    /// reader uses it for keep-alives and per-cycle error codes.
    pub fn status(&self) -> u16 {
        u16::from_be_bytes([self.raw[3], self.raw[4]])
    }

    /// Declared payload length (excludes the status word).
    pub fn payload_len(&self) -> usize {
        self.raw[1] as usize
    }

    /// Payload bytes following the status word.
    pub fn payload(&self) -> &[u8] {
        &self.raw[5..5 + self.payload_len()]
    }

    /// The full validated frame, delimiter through CRC.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}
