//! Transport layer for the microcontroller links

use crate::error::Result;

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Byte transport to a microcontroller
pub trait Transport: Send {
    /// Read into buffer. A read timeout with no data returns `Ok(0)`.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush pending writes
    fn flush(&mut self) -> Result<()>;

    /// Write the whole buffer then flush
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self.write(&data[written..])?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                )
                .into());
            }
            written += n;
        }
        self.flush()
    }
}
