/// Byte-stream link to the reader module.
///
/// The driver issues no I/O besides these three calls, so anything that can
/// move bytes (a serial port, a UART peripheral, an in-memory mock) can sit
/// behind it. Implementations are expected to be "ready" once constructed:
/// the driver writes immediately and never manages the open/close lifecycle
/// itself.
pub trait RfidTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Write a full command frame to the link.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read whatever bytes are available, waiting up to `timeout_ms`.
    /// Returning 0 on timeout is fine; the caller keeps its own deadline.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;

    /// Discard any bytes buffered on the receive side.
    fn clear_input(&mut self) -> Result<(), Self::Error>;
}
