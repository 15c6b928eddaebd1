//! Serial port transport for desktop hosts, via the serialport crate.

use std::time::Duration;

use crate::transport::RfidTransport;

/// Factory default baud rate of the M6e Nano UART.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate` and flush whatever the module sent
    /// while nobody was listening.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_secs(1))
            .open()?;
        std::thread::sleep(Duration::from_millis(500));
        port.clear(serialport::ClearBuffer::Input)?;

        Ok(Self { port })
    }

    /// Open `port_name` at the module's factory default baud rate.
    pub fn open_default(port_name: &str) -> Result<Self, serialport::Error> {
        Self::new(port_name, DEFAULT_BAUD_RATE)
    }
}

impl RfidTransport for SerialTransport {
    type Error = std::io::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.port, data)
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.port
            .set_timeout(Duration::from_millis(timeout_ms as u64))
            .map_err(std::io::Error::other)?;
        std::io::Read::read(&mut self.port, buf)
    }

    fn clear_input(&mut self) -> Result<(), Self::Error> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::other)
    }
}
