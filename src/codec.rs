use bytes::{Buf, BytesMut};
use std::env;
use std::mem;
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{DataType, Frame, CRLF};
use crate::Error;

/// `*<count>` and `$<length>` lines longer than this are rejected instead of buffered forever.
const MAX_HEADER_LENGTH: usize = 64;

#[derive(Debug, ThisError, PartialEq)]
pub enum ProtocolError {
    #[error("expected '{expected}', got '{actual}'")]
    UnexpectedByte { expected: char, actual: char },
    #[error("invalid multibulk length")]
    InvalidMultibulkLength,
    #[error("invalid bulk length")]
    InvalidBulkLength,
    #[error("expected CRLF after bulk string")]
    MissingCrlf,
    #[error("too big header line")]
    HeaderTooLong,
}

/// Where the decoder stopped inside the current request.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum State {
    /// Waiting for `*<count>\r\n`.
    #[default]
    ArrayHeader,
    /// Waiting for the next `$<length>\r\n`, or done when no elements remain.
    BulkHeader,
    /// Waiting for `<length>` bytes followed by `\r\n`.
    BulkBody(usize),
}

/// Incremental decoder for client requests (RESP arrays of bulk strings) and encoder for reply
/// frames.
///
/// Consumed bytes are removed from the read buffer as soon as a header line or a whole bulk body
/// is available, and the position inside the request is kept in `state`. A request split across
/// any number of reads is therefore parsed exactly once, and bulk bodies are taken by length, so
/// they may contain `\r\n`.
#[derive(Debug)]
pub struct FrameCodec {
    state: State,
    remaining: usize,
    elements: Vec<Frame>,
    max_bulk_length: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_bulk_length(Self::max_bulk_length())
    }

    pub fn with_max_bulk_length(max_bulk_length: usize) -> Self {
        Self {
            state: State::ArrayHeader,
            remaining: 0,
            elements: Vec::new(),
            max_bulk_length,
        }
    }

    fn max_bulk_length() -> usize {
        env::var("MAX_BULK_LENGTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(512 * 1024 * 1024)
    }

    fn reset(&mut self) {
        self.state = State::ArrayHeader;
        self.remaining = 0;
        self.elements.clear();
    }

    fn decode_request(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        loop {
            match self.state {
                State::ArrayHeader => {
                    let count = match read_length(src, DataType::Array)? {
                        Some(count) => count.ok_or(ProtocolError::InvalidMultibulkLength)?,
                        None => return Ok(None),
                    };

                    // Never trust the announced count for the allocation size.
                    self.elements = Vec::with_capacity(count.min(1024));
                    self.remaining = count;
                    self.state = State::BulkHeader;
                }
                State::BulkHeader if self.remaining == 0 => {
                    self.state = State::ArrayHeader;
                    let elements = mem::take(&mut self.elements);
                    return Ok(Some(Frame::Array(elements)));
                }
                State::BulkHeader => {
                    let length = match read_length(src, DataType::BulkString)? {
                        Some(length) => length.ok_or(ProtocolError::InvalidBulkLength)?,
                        None => return Ok(None),
                    };

                    if length > self.max_bulk_length {
                        return Err(ProtocolError::InvalidBulkLength);
                    }

                    self.state = State::BulkBody(length);
                }
                State::BulkBody(length) => {
                    let needed = length + CRLF.len();
                    if src.len() < needed {
                        src.reserve(needed - src.len());
                        return Ok(None);
                    }

                    if &src[length..needed] != CRLF {
                        return Err(ProtocolError::MissingCrlf);
                    }

                    let data = src.split_to(length).freeze();
                    src.advance(CRLF.len());

                    self.elements.push(Frame::Bulk(data));
                    self.remaining -= 1;
                    self.state = State::BulkHeader;
                }
            }
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode_request(src) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                // Nothing after a malformed request can be trusted.
                src.clear();
                self.reset();
                Err(err.into())
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.write_to(dst);
        Ok(())
    }
}

/// Reads a `<marker><decimal>\r\n` header line.
///
/// Returns `Ok(None)` while the line is incomplete and `Ok(Some(None))` when the line is complete
/// but does not hold a non-negative integer. The line is only consumed once it is complete.
fn read_length(
    src: &mut BytesMut,
    expected: DataType,
) -> Result<Option<Option<usize>>, ProtocolError> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };

    if DataType::try_from(first) != Ok(expected) {
        return Err(ProtocolError::UnexpectedByte {
            expected: char::from(u8::from(expected)),
            actual: char::from(first),
        });
    }

    let Some(end) = src.windows(CRLF.len()).position(|window| window == CRLF) else {
        if src.len() > MAX_HEADER_LENGTH {
            return Err(ProtocolError::HeaderTooLong);
        }
        return Ok(None);
    };

    if end > MAX_HEADER_LENGTH {
        return Err(ProtocolError::HeaderTooLong);
    }

    let line = src.split_to(end + CRLF.len());
    let length = std::str::from_utf8(&line[1..end])
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok());

    Ok(Some(length))
}
