//! Chunked transfer encoding support
//!
//! The portal's HTML pages are usually sent chunked, so the response parser
//! feeds body bytes through [`ChunkedDecoder`] until the terminating chunk.

use super::{Error, Result};
use bytes::{Buf, BytesMut};

/// Chunked decoder
///
/// Incremental: call [`decode`](ChunkedDecoder::decode) whenever more input
/// has arrived. Consumed bytes are removed from the input buffer.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: DecoderState,
    remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecoderState {
    ChunkSize,
    ChunkData,
    ChunkEnd,
    Trailer,
    Complete,
}

impl ChunkedDecoder {
    /// Create a new chunked decoder
    pub fn new() -> Self {
        ChunkedDecoder {
            state: DecoderState::ChunkSize,
            remaining: 0,
        }
    }

    /// Decode as much of `input` as possible into `output`
    ///
    /// Returns `true` once the last chunk and the trailer section have been
    /// consumed.
    pub fn decode(&mut self, input: &mut BytesMut, output: &mut Vec<u8>) -> Result<bool> {
        loop {
            match self.state {
                DecoderState::ChunkSize => {
                    let Some(crlf_pos) = find_crlf(input) else {
                        return Ok(false);
                    };
                    let line = String::from_utf8_lossy(&input[..crlf_pos]).to_string();
                    input.advance(crlf_pos + 2);

                    // Chunk extensions after ';' are ignored
                    let size_str = line.split(';').next().unwrap_or_default().trim();
                    self.remaining = usize::from_str_radix(size_str, 16)
                        .map_err(|_| Error::InvalidChunkSize(size_str.to_string()))?;

                    self.state = if self.remaining == 0 {
                        DecoderState::Trailer
                    } else {
                        DecoderState::ChunkData
                    };
                }

                DecoderState::ChunkData => {
                    if input.is_empty() {
                        return Ok(false);
                    }
                    let take = self.remaining.min(input.len());
                    output.extend_from_slice(&input[..take]);
                    input.advance(take);
                    self.remaining -= take;

                    if self.remaining == 0 {
                        self.state = DecoderState::ChunkEnd;
                    }
                }

                DecoderState::ChunkEnd => {
                    if input.len() < 2 {
                        return Ok(false);
                    }
                    if &input[..2] != b"\r\n" {
                        return Err(Error::Protocol("Expected CRLF after chunk".to_string()));
                    }
                    input.advance(2);
                    self.state = DecoderState::ChunkSize;
                }

                DecoderState::Trailer => {
                    let Some(crlf_pos) = find_crlf(input) else {
                        return Ok(false);
                    };
                    input.advance(crlf_pos + 2);
                    if crlf_pos == 0 {
                        self.state = DecoderState::Complete;
                    }
                }

                DecoderState::Complete => return Ok(true),
            }
        }
    }

    /// Check if the terminating chunk has been seen
    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::Complete
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the next CRLF in a buffer
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
