//! Length-prefixed framing used on socket connections.
//!
//! A frame is a 6-byte big-endian unsigned length followed by the payload.
//! The length counts the header too, so an empty payload has length 6.
//! [`FrameDecoder`] reassembles frames from arbitrarily split reads and
//! yields every complete frame a read delivered, not just the first.

use thiserror::Error;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 6;
/// Largest frame, header included, accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors raised while framing or reassembling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("declared frame length {0} is shorter than the {HEADER_LEN}-byte header")]
    TooShort(u64),
    #[error("frame length {length} exceeds the limit of {limit} bytes")]
    TooLarge { length: u64, limit: usize },
}

/// Prefix `payload` with its frame length.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
    let total = payload.len() + HEADER_LEN;
    if total > max_frame_size {
        return Err(FrameError::TooLarge {
            length: total as u64,
            limit: max_frame_size,
        });
    }
    let mut framed = Vec::with_capacity(total);
    framed.extend_from_slice(&(total as u64).to_be_bytes()[8 - HEADER_LEN..]);
    framed.extend_from_slice(payload);
    Ok(framed)
}

fn read_length(header: &[u8]) -> u64 {
    header
        .iter()
        .take(HEADER_LEN)
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// Incremental reassembly of frames from a byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    offset: usize,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            offset: 0,
            max_frame_size,
        }
    }

    /// Append bytes received from the stream.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes received but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.offset
    }

    /// Return the payload of the next complete frame, if one is buffered.
    ///
    /// A declared length outside `HEADER_LEN..=max_frame_size` leaves the
    /// stream unsynchronised and is reported as an error; the decoder must not
    /// be used afterwards.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let available = &self.buffer[self.offset..];
        if available.len() < HEADER_LEN {
            self.compact();
            return Ok(None);
        }
        let length = read_length(available);
        if length < HEADER_LEN as u64 {
            return Err(FrameError::TooShort(length));
        }
        if length > self.max_frame_size as u64 {
            return Err(FrameError::TooLarge {
                length,
                limit: self.max_frame_size,
            });
        }
        let length = length as usize;
        if available.len() < length {
            self.compact();
            return Ok(None);
        }
        let payload = available[HEADER_LEN..length].to_vec();
        self.offset += length;
        Ok(Some(payload))
    }

    fn compact(&mut self) {
        if self.offset > 0 {
            self.buffer.drain(..self.offset);
            self.offset = 0;
        }
    }
}
