//! Re-segmentation of the raw serial byte stream into candidate frames.

use log::debug;

use crate::frame::{DELIMITER, FRAME_OVERHEAD, MAX_PAYLOAD_LEN};

/// Accumulates transport bytes and carves them back into frames using the
/// delimiter + length-prefix scheme: a frame is `0xFF`, a payload length
/// byte, and `length + 5` further bytes.
///
/// Frames come out as raw byte vectors, candidates only. Checksum and
/// structural validation belong to [`Frame::parse`](crate::frame::Frame::parse),
/// which runs on every frame downstream.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the transport. Arbitrary split points are fine;
    /// a frame half-delivered here completes on a later call.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// Bytes preceding a delimiter are noise (line glitches, partial frames
    /// after a desync) and are discarded. A length byte that would exceed the
    /// maximum frame size cannot be a real header, so the delimiter is
    /// dropped and the scan resumes. This is how the assembler regains
    /// sync after swallowing garbage that happened to contain 0xFF.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.buf.iter().position(|&b| b == DELIMITER) {
                Some(0) => {}
                Some(start) => {
                    debug!("discarding {start} bytes before frame delimiter");
                    self.buf.drain(..start);
                }
                None => {
                    if !self.buf.is_empty() {
                        debug!("discarding {} bytes with no frame delimiter", self.buf.len());
                        self.buf.clear();
                    }
                    return None;
                }
            }

            if self.buf.len() < 2 {
                return None;
            }

            let payload_len = self.buf[1] as usize;
            if payload_len > MAX_PAYLOAD_LEN {
                debug!("length byte 0x{payload_len:02X} exceeds frame bounds, resyncing");
                self.buf.drain(..1);
                continue;
            }

            let total = payload_len + FRAME_OVERHEAD;
            if self.buf.len() < total {
                return None;
            }

            return Some(self.buf.drain(..total).collect());
        }
    }

    /// Drop any buffered bytes. Used when a new correlation window opens and
    /// stale pre-write bytes must not be mistaken for the reply.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
