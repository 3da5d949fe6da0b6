//! Message framing over an unbounded byte stream.
//!
//! Streaming endpoints push either newline-delimited JSON or, when
//! `delimited=length` is requested, messages preceded by an ASCII decimal
//! byte count on its own line. Blank lines are keep-alives in both modes.

use bytes::{Buf, Bytes, BytesMut};

use crate::DEFAULT_MAX_FRAME_SIZE;

/// How message boundaries are marked on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delimiting {
    /// One message per line.
    #[default]
    Newline,
    /// Each message preceded by its length and a newline.
    Length,
}

/// A unit that could not be demarcated. The framer resynchronizes at the
/// next newline after reporting one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// Length line was not a decimal number.
    #[error("invalid length prefix: {0:?}")]
    InvalidLength(String),

    /// Message grew past the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    Oversized {
        /// Bytes buffered or announced.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// Stream ended in the middle of a frame.
    #[error("unterminated frame of {0} bytes at end of stream")]
    Unterminated(usize),
}

/// Result of extracting one frame.
pub type Frame = Result<Bytes, FramingError>;

/// Incremental frame splitter.
#[derive(Debug)]
pub struct Framer {
    mode: Delimiting,
    buffer: BytesMut,
    max_frame_size: usize,
    /// Length announced by the last prefix line, body not yet complete.
    expected: Option<usize>,
    /// Dropping bytes up to the next newline after an error.
    discarding: bool,
}

impl Framer {
    /// Create a framer for the given mode.
    #[must_use]
    pub fn new(mode: Delimiting) -> Self {
        Self {
            mode,
            buffer: BytesMut::with_capacity(crate::DEFAULT_BUFFER_SIZE),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            expected: None,
            discarding: false,
        }
    }

    /// Set maximum frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Framing mode.
    #[must_use]
    pub const fn mode(&self) -> Delimiting {
        self.mode
    }

    /// Bytes held back waiting for a delimiter.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk and return every frame it completed, in order.
    ///
    /// Never returns a partial frame: incomplete bytes stay buffered until a
    /// later chunk completes them.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }

        if self.buffer.len() > self.max_frame_size {
            frames.push(Err(FramingError::Oversized {
                size: self.buffer.len(),
                limit: self.max_frame_size,
            }));
            self.buffer.clear();
            self.expected = None;
            self.discarding = true;
        }

        frames
    }

    /// Signal end of stream. Reports leftover bytes as an unterminated
    /// frame and resets the framer for the next connection.
    pub fn finish(&mut self) -> Option<FramingError> {
        let leftover = if self.discarding {
            0
        } else {
            trimmed(&self.buffer).len()
        };
        let pending_length = self.expected.is_some();
        self.reset();

        (leftover > 0 || pending_length).then_some(FramingError::Unterminated(leftover))
    }

    /// Drop all buffered state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected = None;
        self.discarding = false;
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.discarding {
            let Some(end) = find_newline(&self.buffer, 0) else {
                self.buffer.clear();
                return None;
            };
            self.buffer.advance(end + 1);
            self.discarding = false;
        }

        match self.mode {
            Delimiting::Newline => self.next_line_frame(),
            Delimiting::Length => self.next_length_frame(),
        }
    }

    fn next_line_frame(&mut self) -> Option<Frame> {
        loop {
            let end = find_newline(&self.buffer, 0)?;
            let line = self.buffer.split_to(end + 1).freeze();
            let body = trimmed_bytes(line);
            if !body.is_empty() {
                return Some(Ok(body));
            }
        }
    }

    fn next_length_frame(&mut self) -> Option<Frame> {
        loop {
            let Some(length) = self.expected else {
                let end = find_newline(&self.buffer, 0)?;
                let line = self.buffer.split_to(end + 1).freeze();
                let prefix = trimmed_bytes(line);
                if prefix.is_empty() {
                    continue;
                }

                match parse_length(&prefix) {
                    Some(length) if length > self.max_frame_size => {
                        self.discarding = true;
                        return Some(Err(FramingError::Oversized {
                            size: length,
                            limit: self.max_frame_size,
                        }));
                    }
                    Some(length) => self.expected = Some(length),
                    None => {
                        return Some(Err(FramingError::InvalidLength(
                            String::from_utf8_lossy(&prefix).into_owned(),
                        )));
                    }
                }
                continue;
            };

            if self.buffer.len() < length {
                return None;
            }

            // The announced length is a lower bound: the frame ends at the
            // first line terminator at or after it.
            let end = find_newline(&self.buffer, length.saturating_sub(1))?;
            let raw = self.buffer.split_to(end + 1).freeze();
            self.expected = None;

            let body = trimmed_bytes(raw);
            if !body.is_empty() {
                return Some(Ok(body));
            }
        }
    }
}

fn find_newline(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| i + from)
}

fn parse_length(prefix: &[u8]) -> Option<usize> {
    if !prefix.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(prefix).ok()?.parse().ok()
}

fn content_range(bytes: &[u8]) -> std::ops::Range<usize> {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    start..end
}

fn trimmed(bytes: &[u8]) -> &[u8] {
    &bytes[content_range(bytes)]
}

fn trimmed_bytes(bytes: Bytes) -> Bytes {
    let range = content_range(&bytes);
    bytes.slice(range)
}
