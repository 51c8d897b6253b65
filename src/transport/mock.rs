//! In-memory transport for tests and bench runs without hardware

use super::Transport;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Mock transport. Clones share the same buffers, so a test can keep one
/// handle while the link under test owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    pending_read_errors: usize,
    fail_writes: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Make the next `count` reads fail with an I/O error
    pub fn inject_read_errors(&self, count: usize) {
        self.inner.lock().pending_read_errors += count;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// All written data
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Written data split into newline-terminated lines
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Bytes injected but not yet consumed by a reader
    pub fn unread(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.pending_read_errors > 0 {
            inner.pending_read_errors -= 1;
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "mock read error").into());
        }

        let available = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "mock write error").into());
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_write() {
        let mock = MockTransport::new();
        let mut link = mock.clone();

        mock.inject_read(b"abc");
        let mut buf = [0u8; 2];
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(mock.unread(), 1);

        link.send(b"STOP\n").unwrap();
        assert_eq!(mock.written_lines(), vec!["STOP".to_string()]);
    }

    #[test]
    fn test_mock_injected_errors() {
        let mock = MockTransport::new();
        let mut link = mock.clone();

        mock.inject_read_errors(1);
        let mut buf = [0u8; 4];
        assert!(link.read(&mut buf).is_err());
        assert_eq!(link.read(&mut buf).unwrap(), 0);

        mock.set_fail_writes(true);
        assert!(link.send(b"x").is_err());
        assert!(mock.written().is_empty());
    }
}
