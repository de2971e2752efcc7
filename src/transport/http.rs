//! Polling adapter for HTTP response bodies

use std::thread;
use std::time::{Duration, Instant};

use super::ChunkSource;
use crate::error::TransportError;

/// What an HTTP client exposes about an open response body
pub trait StreamReader {
    /// The peer has not closed the connection
    fn connected(&self) -> bool;

    /// Bytes that can be read right now without blocking
    fn available(&mut self) -> usize;

    /// Read up to `buf.len()` bytes; may return fewer
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// `Content-Length`, if the server sent one
    fn content_length(&self) -> Option<usize> {
        None
    }
}

/// Turns a [`StreamReader`] into a [`ChunkSource`]
///
/// End-of-stream is either the announced content length or the peer
/// closing after the last buffered byte. Silence longer than
/// `read_timeout` is [`TransportError::Timeout`].
pub struct PollingSource<R> {
    reader: R,
    read_timeout: Duration,
    poll_interval: Duration,
    received: usize,
}

impl<R: StreamReader> PollingSource<R> {
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader,
            read_timeout,
            poll_interval: Duration::from_millis(10),
            received: 0,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Body bytes handed out so far
    pub fn received(&self) -> usize {
        self.received
    }
}

impl<R: StreamReader> ChunkSource for PollingSource<R> {
    fn total_len(&self) -> Option<usize> {
        self.reader.content_length()
    }

    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        let limit = match self.total_len() {
            Some(len) if self.received >= len => return Ok(None),
            Some(len) => buf.len().min(len - self.received),
            None => buf.len(),
        };
        if limit == 0 {
            return Ok(None);
        }

        let started = Instant::now();
        loop {
            let available = self.reader.available();
            if available > 0 {
                let n = self.reader.read_bytes(&mut buf[..limit.min(available)])?;
                if n > 0 {
                    self.received += n;
                    return Ok(Some(n));
                }
            }

            if !self.reader.connected() {
                return match self.total_len() {
                    Some(len) if self.received < len => {
                        log::warn!("Connection closed after {} of {} bytes", self.received, len);
                        Err(TransportError::Disconnected)
                    }
                    _ => {
                        log::debug!("Connection closed after {} bytes", self.received);
                        Ok(None)
                    }
                };
            }

            if started.elapsed() >= self.read_timeout {
                log::warn!("No data for {:?} after {} bytes", self.read_timeout, self.received);
                return Err(TransportError::Timeout);
            }
            thread::sleep(self.poll_interval);
        }
    }
}
