//! Data model and error types for reader operations.

use std::fmt;

use crate::frame::FrameError;

/// One sighting of a tag during a continuous read.
///
/// Constructed per inbound report frame and handed to the caller's callback;
/// the driver keeps no per-EPC state of its own.
#[derive(Debug, Clone)]
pub struct TagRecord {
    /// EPC identifier bytes, excluding the PC word and the tag's own CRC.
    pub epc: Vec<u8>,
    /// Signal strength reported for this sighting.
    pub rssi: u8,
}

impl TagRecord {
    /// EPC as an uppercase hex string, the way inventory tools print it.
    pub fn epc_hex(&self) -> String {
        bytes_to_hex(&self.epc)
    }
}

impl PartialEq for TagRecord {
    fn eq(&self, other: &Self) -> bool {
        self.epc == other.epc
    }
}

/// Decoded firmware/hardware version reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub bootloader: [u8; 4],
    pub hardware: [u8; 4],
    /// Firmware build date, BCD-packed as YYYYMMDD.
    pub firmware_date: [u8; 4],
    pub firmware: [u8; 4],
    /// Bitmask of air protocols the firmware supports.
    pub supported_protocols: u32,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.firmware;
        let [y1, y2, m, day] = self.firmware_date;
        write!(
            f,
            "firmware {a:02X}.{b:02X}.{c:02X}.{d:02X} ({y1:02X}{y2:02X}-{m:02X}-{day:02X})"
        )
    }
}

/// Regulatory region codes understood by the module firmware.
///
/// These select the internal frequency plan and must match local regulations;
/// the values are fixed by the firmware contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Region {
    NorthAmerica = 0x01,
    India = 0x04,
    Japan = 0x05,
    China = 0x06,
    Europe = 0x08,
    Korea = 0x09,
    Australia = 0x0B,
    NewZealand = 0x0C,
    NorthAmerica2 = 0x0D,
    NorthAmerica3 = 0x0E,
    /// Unrestricted test mode; not legal for deployment.
    Open = 0xFF,
}

impl TryFrom<u8> for Region {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Region::NorthAmerica),
            0x04 => Ok(Region::India),
            0x05 => Ok(Region::Japan),
            0x06 => Ok(Region::China),
            0x08 => Ok(Region::Europe),
            0x09 => Ok(Region::Korea),
            0x0B => Ok(Region::Australia),
            0x0C => Ok(Region::NewZealand),
            0x0D => Ok(Region::NorthAmerica2),
            0x0E => Ok(Region::NorthAmerica3),
            0xFF => Ok(Region::Open),
            other => Err(other),
        }
    }
}

/// Air-interface protocol codes for [`set_tag_protocol`](crate::M6eReader::set_tag_protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagProtocol {
    None = 0x00,
    Iso180006b = 0x03,
    /// EPC UHF Generation 2, the protocol the continuous-read command starts.
    Gen2 = 0x05,
    Iso180006bUcode = 0x06,
    Ipx64 = 0x07,
    Ipx256 = 0x08,
    Ata = 0x1D,
}

impl TryFrom<u8> for TagProtocol {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(TagProtocol::None),
            0x03 => Ok(TagProtocol::Iso180006b),
            0x05 => Ok(TagProtocol::Gen2),
            0x06 => Ok(TagProtocol::Iso180006bUcode),
            0x07 => Ok(TagProtocol::Ipx64),
            0x08 => Ok(TagProtocol::Ipx256),
            0x1D => Ok(TagProtocol::Ata),
            other => Err(other),
        }
    }
}

/// Errors surfaced by reader operations.
#[derive(Debug, thiserror::Error)]
pub enum M6eError {
    /// Transport layer failure (serial port, UART, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame failed validation while a command was waiting on it.
    /// Fatal to that command; never retried.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A validated reply did not decode as the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No reply frame arrived within the correlation window.
    #[error("timed out waiting for a reply frame")]
    Timeout,

    /// A unary command was issued while a continuous read was active. The
    /// reply stream cannot tell the two apart, so this is refused outright.
    #[error("continuous read in progress")]
    AlreadyReading,

    /// A tag-stream operation was issued while no continuous read was active.
    #[error("no continuous read in progress")]
    NotReading,
}

/// Convert bytes to an uppercase hex string.
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
