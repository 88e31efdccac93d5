//! Newline framing for the inbound answer stream.
//!
//! Lines are split on `\n` only. Everything else, including a trailing `\r`,
//! stays part of the line. Bytes are buffered until a line completes, so a
//! multi-byte character split across network chunks decodes correctly.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Line splitter usable directly as a `tokio_util` decoder.
///
/// Unlike `LinesCodec`, the final unterminated line is emitted at end of
/// stream instead of being reported as an error.
#[derive(Debug, Default)]
pub struct LineCodec {
    // Bytes of the buffer already searched for '\n'.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn split_line(&mut self, buf: &mut BytesMut) -> Option<String> {
        let offset = buf[self.next_index..].iter().position(|b| *b == b'\n');
        match offset {
            Some(offset) => {
                let newline_index = self.next_index + offset;
                self.next_index = 0;
                let line = buf.split_to(newline_index + 1);
                Some(String::from_utf8_lossy(&line[..newline_index]).into_owned())
            }
            None => {
                self.next_index = buf.len();
                None
            }
        }
    }

    fn split_rest(&mut self, buf: &mut BytesMut) -> Option<String> {
        self.next_index = 0;
        if buf.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&buf[..]).into_owned();
        buf.clear();
        Some(rest)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        Ok(self.split_line(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        match self.split_line(buf) {
            Some(line) => Ok(Some(line)),
            None => Ok(self.split_rest(buf)),
        }
    }
}

/// Push-style frame reader holding one carry-over buffer across reads.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
    codec: LineCodec,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every line completed by `chunk`, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.feed_bytes(chunk.as_bytes())
    }

    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(line) = self.codec.split_line(&mut self.buf) {
            lines.push(line);
        }
        lines
    }

    /// Drains the carry-over buffer at end of stream.
    ///
    /// This is the only place a line is produced without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        self.codec.split_rest(&mut self.buf)
    }

    /// Bytes currently held waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
