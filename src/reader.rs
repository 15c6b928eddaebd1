use log::{debug, error, warn};
use std::time::{Duration, Instant};

use crate::assembler::FrameAssembler;
use crate::frame::{encode_command, Frame};
use crate::transport::RfidTransport;
use crate::types::{M6eError, Region, TagProtocol, TagRecord, VersionInfo};

/// Continuous-read processor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Idle,
    Streaming,
}

/// Driver for the ThingMagic M6e Nano reader module.
///
/// Owns the transport and the frame assembler; all protocol logic lives here.
/// Commands follow a strict one-outstanding-request discipline: each write is
/// correlated with the next validated frame off the wire, and nothing else.
/// While a continuous read is streaming, that correlation is impossible, so
/// unary commands are refused until [`stop_reading`](Self::stop_reading).
pub struct M6eReader<T: RfidTransport> {
    transport: T,
    assembler: FrameAssembler,
    state: ReadState,
}

impl<T: RfidTransport> M6eReader<T> {
    // Opcodes (subset of the vendor serial command set)
    const VERSION: u8 = 0x03;
    const READ_TAG_ID_MULTIPLE: u8 = 0x22;
    const MULTI_PROTOCOL_TAG_OP: u8 = 0x2F;
    const GET_READ_TX_POWER: u8 = 0x62;
    const GET_WRITE_TX_POWER: u8 = 0x64;
    const SET_ANTENNA_PORT: u8 = 0x91;
    const SET_READ_TX_POWER: u8 = 0x92;
    const SET_TAG_PROTOCOL: u8 = 0x93;
    const SET_WRITE_TX_POWER: u8 = 0x94;
    const SET_REGION: u8 = 0x97;

    /// Heartbeat status the module emits during continuous read.
    const STATUS_KEEP_ALIVE: u16 = 0x0400;
    /// Payload length of the "cycle finished, zero tags" report.
    const TAG_COUNT_REPORT_LEN: usize = 8;

    const RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);
    const READ_SLICE_MS: u32 = 50;

    /// Continuous-read sub-command carried under MULTI_PROTOCOL_TAG_OP:
    /// zeroed timeout, continuous mode, the READ_TAG_ID_MULTIPLE sub-opcode,
    /// zero search flags, Gen2 protocol ID, then the module's fixed
    /// search-flag and timing words.
    const START_READING_PAYLOAD: [u8; 16] = [
        0x00, 0x00, // timeout
        0x01, // continuous read mode
        0x22, // sub-command opcode: READ_TAG_ID_MULTIPLE
        0x00, 0x00, // search flags
        0x05, // protocol ID: Gen2
        0x07, 0x22, 0x10, 0x00, 0x1B, 0x03, 0xE8, 0x01, 0xFF,
    ];

    /// Stop sub-command under MULTI_PROTOCOL_TAG_OP.
    const STOP_READING_PAYLOAD: [u8; 3] = [0x00, 0x00, 0x02];

    /// Create a driver on top of an opened transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            assembler: FrameAssembler::new(),
            state: ReadState::Idle,
        }
    }

    /// Query bootloader/hardware/firmware versions.
    pub fn get_version(&mut self) -> Result<VersionInfo, M6eError> {
        let reply = self.command(Self::VERSION, &[])?;
        Self::parse_version(&reply)
    }

    /// Select the regulatory region (frequency plan).
    pub fn set_region(&mut self, region: Region) -> Result<(), M6eError> {
        self.command(Self::SET_REGION, &[region as u8])?;
        Ok(())
    }

    /// Set transmit power for tag reads, in dBm.
    ///
    /// Encoded as centi-dBm magnitude, capped at the module's 27.00 dBm
    /// ceiling; the sign is discarded.
    pub fn set_read_power(&mut self, dbm: f32) -> Result<(), M6eError> {
        let power = encode_power(dbm);
        self.command(Self::SET_READ_TX_POWER, &power.to_be_bytes())?;
        Ok(())
    }

    /// Current read transmit power in dBm.
    pub fn get_read_power(&mut self) -> Result<f32, M6eError> {
        let reply = self.command(Self::GET_READ_TX_POWER, &[])?;
        Self::parse_power(&reply)
    }

    /// Set transmit power for tag writes, in dBm. Same encoding as
    /// [`set_read_power`](Self::set_read_power).
    pub fn set_write_power(&mut self, dbm: f32) -> Result<(), M6eError> {
        let power = encode_power(dbm);
        self.command(Self::SET_WRITE_TX_POWER, &power.to_be_bytes())?;
        Ok(())
    }

    /// Current write transmit power in dBm.
    pub fn get_write_power(&mut self) -> Result<f32, M6eError> {
        let reply = self.command(Self::GET_WRITE_TX_POWER, &[])?;
        Self::parse_power(&reply)
    }

    /// Select the air-interface protocol, normally [`TagProtocol::Gen2`].
    pub fn set_tag_protocol(&mut self, protocol: TagProtocol) -> Result<(), M6eError> {
        self.command(Self::SET_TAG_PROTOCOL, &[0x00, protocol as u8])?;
        Ok(())
    }

    /// Route TX and RX to antenna ports. The M6e Nano exposes a single
    /// physical port, so both arguments are normally 1.
    pub fn set_antenna_port(&mut self, tx_port: u8, rx_port: u8) -> Result<(), M6eError> {
        self.command(Self::SET_ANTENNA_PORT, &[tx_port, rx_port])?;
        Ok(())
    }

    /// Whether a continuous read is active.
    pub fn is_reading(&self) -> bool {
        self.state == ReadState::Streaming
    }

    /// Start a continuous tag read.
    ///
    /// Writes the start command and returns without waiting for the module's
    /// acknowledgement; from this moment the wire carries an interleaved
    /// stream of command echoes, keep-alives and tag reports, which
    /// [`poll_tags`](Self::poll_tags) filters. Unary commands are refused
    /// until the stream is stopped.
    pub fn start_reading(&mut self) -> Result<(), M6eError> {
        if self.state == ReadState::Streaming {
            return Err(M6eError::AlreadyReading);
        }
        self.send(Self::MULTI_PROTOCOL_TAG_OP, &Self::START_READING_PAYLOAD)?;
        self.state = ReadState::Streaming;
        Ok(())
    }

    /// Pump the tag stream for `window`, invoking `on_tag` for every decoded
    /// sighting, in arrival order. Returns the number of tags delivered.
    ///
    /// Frames that fail validation are dropped and logged; one corrupted
    /// cycle must not end a multi-hour session. Transport read errors inside
    /// the pump are treated the same way.
    pub fn poll_tags<F>(&mut self, window: Duration, mut on_tag: F) -> Result<usize, M6eError>
    where
        F: FnMut(TagRecord),
    {
        if self.state != ReadState::Streaming {
            return Err(M6eError::NotReading);
        }

        let start = Instant::now();
        let mut delivered = 0;

        while start.elapsed() < window {
            let mut buf = [0u8; 256];
            match self.transport.read(&mut buf, Self::READ_SLICE_MS) {
                Ok(n) if n > 0 => {
                    self.assembler.push_bytes(&buf[..n]);
                    while let Some(raw) = self.assembler.next_frame() {
                        if let Some(tag) = Self::dispatch_stream_frame(&raw) {
                            on_tag(tag);
                            delivered += 1;
                        }
                    }
                }
                Ok(_) => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    warn!("read error during continuous read: {e:?}");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }

        Ok(delivered)
    }

    /// Stop a continuous read and wait for the module's acknowledgement.
    ///
    /// Tag reports still in flight from the last cycle are discarded; once
    /// this returns, nothing from the old stream can surface anywhere. Legal
    /// in the idle state too, where a defensive stop at startup clears a
    /// module someone left streaming.
    pub fn stop_reading(&mut self) -> Result<(), M6eError> {
        self.send(Self::MULTI_PROTOCOL_TAG_OP, &Self::STOP_READING_PAYLOAD)?;

        let deadline = Instant::now() + Self::RESPONSE_TIMEOUT;
        loop {
            let raw = self.read_frame(deadline)?;
            match Frame::parse(&raw) {
                Ok(frame) if frame.opcode() == Self::MULTI_PROTOCOL_TAG_OP => {
                    debug!("stop acknowledged");
                    break;
                }
                Ok(frame) => {
                    debug!("discarding 0x{:02X} frame while stopping", frame.opcode());
                }
                Err(e) => debug!("discarding corrupt frame while stopping: {e}"),
            }
        }

        self.state = ReadState::Idle;
        self.assembler.clear();
        self.transport
            .clear_input()
            .map_err(|e| M6eError::Transport(format!("{e:?}")))?;
        Ok(())
    }

    /// Start a continuous read, collect sightings for `window`, then stop.
    pub fn read_for_duration(&mut self, window: Duration) -> Result<Vec<TagRecord>, M6eError> {
        let mut tags = Vec::new();
        self.read_for_duration_with_callback(window, |tag| tags.push(tag))?;
        Ok(tags)
    }

    /// Start a continuous read, deliver sightings to `on_tag` for `window`,
    /// then stop. Returns the number of tags delivered.
    pub fn read_for_duration_with_callback<F>(
        &mut self,
        window: Duration,
        on_tag: F,
    ) -> Result<usize, M6eError>
    where
        F: FnMut(TagRecord),
    {
        self.start_reading()?;
        let delivered = self.poll_tags(window, on_tag)?;
        self.stop_reading()?;
        Ok(delivered)
    }

    /// Classify one assembled frame from the continuous-read stream.
    ///
    /// Returns the decoded tag for genuine reports and `None` for everything
    /// the stream is expected to carry besides them: command echoes, foreign
    /// opcodes, keep-alives, per-cycle errors, zero-tag count reports and
    /// frames that fail validation outright.
    fn dispatch_stream_frame(raw: &[u8]) -> Option<TagRecord> {
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping corrupt stream frame: {e}");
                return None;
            }
        };

        if frame.opcode() == Self::MULTI_PROTOCOL_TAG_OP {
            debug!("ignoring command echo");
            return None;
        }
        if frame.opcode() != Self::READ_TAG_ID_MULTIPLE {
            debug!("ignoring unexpected opcode 0x{:02X}", frame.opcode());
            return None;
        }
        match frame.status() {
            Self::STATUS_KEEP_ALIVE => {
                debug!("ignoring keep-alive");
                return None;
            }
            0x0000 => {}
            status => {
                debug!("ignoring cycle with error status 0x{status:04X}");
                return None;
            }
        }
        if frame.payload_len() == Self::TAG_COUNT_REPORT_LEN {
            debug!("ignoring zero-tag cycle report");
            return None;
        }

        match Self::decode_tag(&frame) {
            Ok(tag) => Some(tag),
            Err(e) => {
                warn!("dropping undecodable tag report: {e}");
                None
            }
        }
    }

    /// Extract RSSI and EPC from a validated tag report.
    ///
    /// The report's metadata sits at fixed offsets from the frame start:
    /// RSSI at 12, the embedded-data bit count at 24 and the EPC bit count at
    /// 27, with the EPC region itself starting at 31 plus the embedded-data
    /// bytes.
    pub(crate) fn decode_tag(frame: &Frame) -> Result<TagRecord, M6eError> {
        const RSSI_OFFSET: usize = 12;
        const DATA_BITS_OFFSET: usize = 24;
        const EPC_BITS_OFFSET: usize = 27;
        const EPC_REGION_OFFSET: usize = 31;

        let raw = frame.as_bytes();
        if raw.len() < EPC_BITS_OFFSET + 2 {
            return Err(M6eError::InvalidResponse(format!(
                "tag report too short: {} bytes",
                raw.len()
            )));
        }

        let rssi = raw[RSSI_OFFSET];
        let data_bits = u16::from_be_bytes([raw[DATA_BITS_OFFSET], raw[DATA_BITS_OFFSET + 1]]);
        let epc_bits = u16::from_be_bytes([raw[EPC_BITS_OFFSET], raw[EPC_BITS_OFFSET + 1]]);
        let data_bytes = (data_bits as usize + 7) / 8;
        let epc_bytes = (epc_bits as usize + 7) / 8;

        // The EPC bit count covers the PC word and the tag's own CRC along
        // with the EPC proper; the slice starts two past the PC and drops
        // those four bytes from the count.
        // TODO: verify against captures of tags with non-96-bit EPCs.
        let start = EPC_REGION_OFFSET + data_bytes;
        let end = start + epc_bytes.saturating_sub(4);
        if end > raw.len() - 2 {
            return Err(M6eError::InvalidResponse(format!(
                "EPC length field points past frame end ({end} > {})",
                raw.len() - 2
            )));
        }

        Ok(TagRecord {
            epc: raw[start..end].to_vec(),
            rssi,
        })
    }

    fn parse_version(frame: &Frame) -> Result<VersionInfo, M6eError> {
        let payload = frame.payload();
        if payload.len() < 20 {
            return Err(M6eError::InvalidResponse(format!(
                "version reply too short: {} bytes",
                payload.len()
            )));
        }
        let field =
            |i: usize| -> [u8; 4] { [payload[i], payload[i + 1], payload[i + 2], payload[i + 3]] };
        Ok(VersionInfo {
            bootloader: field(0),
            hardware: field(4),
            firmware_date: field(8),
            firmware: field(12),
            supported_protocols: u32::from_be_bytes(field(16)),
        })
    }

    fn parse_power(frame: &Frame) -> Result<f32, M6eError> {
        let payload = frame.payload();
        if payload.len() < 2 {
            return Err(M6eError::InvalidResponse(format!(
                "power reply too short: {} bytes",
                payload.len()
            )));
        }
        Ok(u16::from_be_bytes([payload[0], payload[1]]) as f32 / 100.0)
    }

    /// Send a unary command and correlate it with the next validated frame.
    ///
    /// Precondition: no other command outstanding (`&mut self` enforces that
    /// within a thread) and no continuous read active (checked). A frame that
    /// fails validation fails the whole operation. No retries.
    fn command(&mut self, opcode: u8, payload: &[u8]) -> Result<Frame, M6eError> {
        if self.state == ReadState::Streaming {
            return Err(M6eError::AlreadyReading);
        }

        self.send(opcode, payload)?;
        let raw = self.read_frame(Instant::now() + Self::RESPONSE_TIMEOUT)?;
        let frame = Frame::parse(&raw)?;
        debug!("<< {} {:02X?}", opcode_name(frame.opcode()), raw);

        if frame.opcode() != opcode {
            return Err(M6eError::InvalidResponse(format!(
                "reply opcode 0x{:02X} does not echo command 0x{opcode:02X}",
                frame.opcode()
            )));
        }
        Ok(frame)
    }

    /// Encode and write one command, after dropping any stale inbound bytes
    /// so the next assembled frame really is the reply to this write.
    fn send(&mut self, opcode: u8, payload: &[u8]) -> Result<(), M6eError> {
        self.assembler.clear();
        self.transport
            .clear_input()
            .map_err(|e| M6eError::Transport(format!("{e:?}")))?;

        let cmd = encode_command(opcode, payload);
        debug!(">> {} {:02X?}", opcode_name(opcode), cmd);
        self.transport
            .write(&cmd)
            .map_err(|e| M6eError::Transport(format!("{e:?}")))?;
        Ok(())
    }

    /// Block until the assembler yields a frame or `deadline` passes.
    fn read_frame(&mut self, deadline: Instant) -> Result<Vec<u8>, M6eError> {
        loop {
            if let Some(raw) = self.assembler.next_frame() {
                return Ok(raw);
            }
            if Instant::now() >= deadline {
                return Err(M6eError::Timeout);
            }

            let mut buf = [0u8; 256];
            match self.transport.read(&mut buf, Self::READ_SLICE_MS) {
                Ok(n) if n > 0 => self.assembler.push_bytes(&buf[..n]),
                Ok(_) => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    error!("read error: {e:?}");
                    return Err(M6eError::Transport(format!("{e:?}")));
                }
            }
        }
    }
}

/// Scale dBm to the wire's centi-dBm magnitude: absolute value, rounded,
/// capped at the module's 2700 centi-dBm ceiling.
pub(crate) fn encode_power(dbm: f32) -> u16 {
    const MAX_CENTI_DBM: u16 = 2700;
    ((dbm * 100.0).abs().round() as u16).min(MAX_CENTI_DBM)
}

/// Opcode names for debug logs.
fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        0x03 => "VERSION",
        0x22 => "READ_TAG_ID_MULTIPLE",
        0x2F => "MULTI_PROTOCOL_TAG_OP",
        0x62 => "GET_READ_TX_POWER",
        0x64 => "GET_WRITE_TX_POWER",
        0x91 => "SET_ANTENNA_PORT",
        0x92 => "SET_READ_TX_POWER",
        0x93 => "SET_TAG_PROTOCOL",
        0x94 => "SET_WRITE_TX_POWER",
        0x97 => "SET_REGION",
        _ => "UNKNOWN",
    }
}
