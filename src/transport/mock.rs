//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// In-memory transport for driving the pipeline without hardware.
///
/// Clonable: a test keeps one handle for injecting bytes while the
/// supervisor's reader thread owns the other.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

struct MockInner {
    read_buffer: VecDeque<u8>,
    written: Vec<u8>,
    /// Next read fails with a transport error (simulates a dropped link)
    fail_next_read: bool,
    input_cleared: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockInner {
                read_buffer: VecDeque::new(),
                written: Vec::new(),
                fail_next_read: false,
                input_cleared: false,
            })),
        }
    }

    /// Queue bytes for the reader to consume
    pub fn inject(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.extend(data);
    }

    /// Queue a newline-terminated protocol line
    pub fn inject_line(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.extend(line.as_bytes());
        inner.read_buffer.push_back(b'\n');
    }

    /// Everything the host wrote (control bytes, wake sequences)
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Make the next read fail as if the link dropped
    pub fn fail_next_read(&self) {
        self.inner.lock().unwrap().fail_next_read = true;
    }

    /// Whether the host discarded stale input after opening
    pub fn input_was_cleared(&self) -> bool {
        self.inner.lock().unwrap().input_cleared
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_read {
            inner.fail_next_read = false;
            return Err(Error::Transport("link dropped".to_string()));
        }

        let available = inner.read_buffer.len().min(buffer.len());
        for slot in buffer.iter_mut().take(available) {
            *slot = inner.read_buffer.pop_front().unwrap();
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.clear();
        inner.input_cleared = true;
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().unwrap().read_buffer.len())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
