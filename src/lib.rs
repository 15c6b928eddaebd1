//! Driver for the ThingMagic M6e Nano UHF RFID reader module.
//!
//! Talks the vendor's length-delimited, CRC-protected serial protocol:
//! configuration commands with correlated replies, and a continuous tag-read
//! stream that is filtered down to individual tag sightings.
//!
//! # Features
//!
//! - `serial` - Serial port transport for desktop using the serialport crate
//! - `uart-esp32` - UART transport for ESP32 using esp-idf-svc
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use m6e_rfid::{M6eReader, Region, SerialTransport, TagProtocol};
//!
//! let transport = SerialTransport::open_default("/dev/ttyUSB0")?;
//! let mut reader = M6eReader::new(transport);
//!
//! reader.stop_reading()?; // in case a previous run left the module streaming
//! reader.set_region(Region::NorthAmerica)?;
//! reader.set_read_power(20.05)?;
//! reader.set_tag_protocol(TagProtocol::Gen2)?;
//! reader.set_antenna_port(1, 1)?;
//!
//! for tag in reader.read_for_duration(Duration::from_secs(2))? {
//!     println!("{} rssi={}", tag.epc_hex(), tag.rssi);
//! }
//! ```

mod assembler;
mod frame;
mod reader;
mod transport;
mod types;

#[cfg(feature = "uart-esp32")]
mod uart;

#[cfg(feature = "serial")]
mod serial;

// Re-exports
pub use assembler::FrameAssembler;
pub use frame::{DELIMITER, Frame, FrameError, encode_command, encode_reply};
pub use reader::M6eReader;
pub use transport::RfidTransport;
pub use types::{M6eError, Region, TagProtocol, TagRecord, VersionInfo};

#[cfg(feature = "uart-esp32")]
pub use uart::UartTransport;

#[cfg(feature = "serial")]
pub use serial::{DEFAULT_BAUD_RATE, SerialTransport};
