//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the buses sensors hang off (UART, I2C).
//!     abstracts away the difference between running on the station's board
//!     (using `rppal`) and a development machine (using mocks).
//!
//! design:
//!     - every handle is opened for exactly one driver read and dropped when
//!       that read returns; nothing here is held across poll ticks.
//!     - all calls are blocking; drivers run them under spawn_blocking.
//!
//! relationships:
//!     - used by: drivers/* (serial and i2c sessions)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;
use std::time::Duration;

/// how long a single blocking serial read may wait before returning 0 bytes.
/// drivers loop on this, checking their own deadline between reads.
pub const SERIAL_POLL: Duration = Duration::from_millis(100);

/// an open serial port; closed when dropped
pub trait SerialLink: Send {
    /// reads whatever is available, waiting at most SERIAL_POLL.
    /// Ok(0) means nothing arrived in that window.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, data: &[u8]) -> Result<()>;
    /// drops bytes the device sent before we were ready to listen
    fn discard_input(&mut self) -> Result<()>;
}

pub trait HardwareProvider: Send + Sync {
    fn open_serial(&self, path: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>>;
    /// one write-then-read transaction on an i2c bus; `settle` is waited
    /// between the request and reading the response
    fn i2c_transfer(
        &self,
        bus: u8,
        addr: u16,
        write_data: &[u8],
        settle: Duration,
        read_len: usize,
    ) -> Result<Vec<u8>>;
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new() -> Self {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Self {}
    }
}

#[cfg(not(feature = "hardware"))]
struct MockSerial {
    path: String,
}

#[cfg(not(feature = "hardware"))]
impl SerialLink for MockSerial {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        // a silent line: drivers run into their own timeout
        std::thread::sleep(SERIAL_POLL);
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        tracing::debug!("[MOCK SERIAL] {} write {}", self.path, hex::encode(data));
        Ok(())
    }

    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(not(feature = "hardware"))]
impl HardwareProvider for Hal {
    fn open_serial(&self, path: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        tracing::debug!("[MOCK SERIAL] open {} @ {}", path, baud_rate);
        Ok(Box::new(MockSerial { path: path.to_string() }))
    }

    fn i2c_transfer(
        &self,
        bus: u8,
        addr: u16,
        write_data: &[u8],
        _settle: Duration,
        read_len: usize,
    ) -> Result<Vec<u8>> {
        tracing::debug!(
            "[MOCK I2C] Bus: {}, Addr: 0x{:02X}, Write: {}, ReadLen: {}",
            bus,
            addr,
            hex::encode(write_data),
            read_len
        );
        Ok(vec![0u8; read_len])
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi class boards)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new() -> Self {
        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        Self {}
    }
}

#[cfg(feature = "hardware")]
struct UartLink {
    uart: rppal::uart::Uart,
}

#[cfg(feature = "hardware")]
impl SerialLink for UartLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.uart.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            written += self.uart.write(&data[written..])?;
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<()> {
        self.uart.flush(rppal::uart::Queue::Input)?;
        Ok(())
    }
}

#[cfg(feature = "hardware")]
impl HardwareProvider for Hal {
    fn open_serial(&self, path: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        use rppal::uart::{Parity, Uart};

        let mut uart = Uart::with_path(path, baud_rate, Parity::None, 8, 1).map_err(|e| {
            if matches!(&e, rppal::uart::Error::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied) {
                anyhow::anyhow!("{}: {} (is the agent user in the 'dialout' group?)", path, e)
            } else {
                anyhow::anyhow!("{}: {}", path, e)
            }
        })?;
        // non-blocking style reads: return after SERIAL_POLL even if nothing came in
        uart.set_read_mode(0, SERIAL_POLL)?;
        Ok(Box::new(UartLink { uart }))
    }

    fn i2c_transfer(
        &self,
        bus: u8,
        addr: u16,
        write_data: &[u8],
        settle: Duration,
        read_len: usize,
    ) -> Result<Vec<u8>> {
        use rppal::i2c::I2c;
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(addr)?;

        if !write_data.is_empty() {
            i2c.write(write_data)?;
        }
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }

        if read_len > 0 {
            let mut read_buf = vec![0u8; read_len];
            i2c.read(&mut read_buf)?;
            tracing::trace!("[I2C] 0x{:02X} <- {}", addr, hex::encode(&read_buf));
            Ok(read_buf)
        } else {
            Ok(vec![])
        }
    }
}

impl Default for Hal {
    fn default() -> Self {
        Self::new()
    }
}
