//! Transport layer for I/O abstraction

use crate::error::Result;

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Transport trait for the sensor link
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read.
    ///
    /// A read timeout is not an error: implementations return `Ok(0)` so the
    /// caller's loop keeps ticking (the pairing timeout depends on this).
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Discard anything already buffered on the receive side.
    ///
    /// Called once after open: bytes queued before the host started reading
    /// belong to no line we can frame.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }
}
