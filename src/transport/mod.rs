//! Byte sources the ingestion session pulls from
//!
//! HTTP bodies are polled, MQTT payloads are pushed by the network stack in
//! fragments. Both end up behind [`ChunkSource`] so the decoder never sees
//! where the bytes came from or how they were cut.

mod http;
mod mqtt;

pub use http::{PollingSource, StreamReader};
pub use mqtt::{Fragment, MqttSource};

use crate::error::TransportError;

/// Read buffer size used by the firmware
pub const CHUNK_LEN: usize = 128;

/// A stream of bytes handed out in chunks of arbitrary size
pub trait ChunkSource {
    /// Stream length, when the transport announces it
    fn total_len(&self) -> Option<usize>;

    /// Fill the front of `buf`
    ///
    /// `Ok(Some(n))` with `n > 0` for data, `Ok(None)` at end-of-stream.
    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError>;
}

impl<T: ChunkSource + ?Sized> ChunkSource for &mut T {
    fn total_len(&self) -> Option<usize> {
        (**self).total_len()
    }

    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        (**self).next_chunk(buf)
    }
}

/// In-memory stream cut at fixed offsets; handy for replaying captures
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    cuts: Vec<usize>,
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Hand out `data` in pieces of at most `chunk` bytes
    pub fn new(data: &'a [u8], chunk: usize) -> Self {
        let chunk = chunk.max(1);
        Self {
            data,
            cuts: (chunk..data.len()).step_by(chunk).collect(),
            pos: 0,
        }
    }

    /// Hand out `data` split exactly at `cuts`
    pub fn with_cuts(data: &'a [u8], mut cuts: Vec<usize>) -> Self {
        cuts.retain(|&c| c > 0 && c < data.len());
        cuts.sort_unstable();
        cuts.dedup();
        Self { data, cuts, pos: 0 }
    }
}

impl ChunkSource for SliceSource<'_> {
    fn total_len(&self) -> Option<usize> {
        Some(self.data.len())
    }

    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        if self.pos >= self.data.len() || buf.is_empty() {
            return Ok(None);
        }
        let boundary = self
            .cuts
            .iter()
            .copied()
            .find(|&c| c > self.pos)
            .unwrap_or(self.data.len());
        let end = boundary.min(self.pos + buf.len());
        let n = end - self.pos;
        buf[..n].copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(Some(n))
    }
}
