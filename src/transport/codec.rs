//! Raw line framing for envelope streams.
//!
//! Lines come back as bytes, not strings: validating the envelope is the
//! dispatcher's job, and a bad line must never end the stream. Oversized
//! lines are skipped up to their newline and decoding carries on.

use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Newline-delimited frames of at most `max_len` bytes.
#[derive(Debug)]
pub struct RawLineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
    /// Inside an oversized line, dropping bytes until its newline.
    discarding: bool,
}

impl RawLineCodec {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len: max_len.max(1),
            discarding: false,
        }
    }

    fn take_line(src: &mut BytesMut, newline: usize) -> Vec<u8> {
        let mut line = src.split_to(newline + 1);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.truncate(newline - 1);
        }
        line.to_vec()
    }
}

impl Decoder for RawLineCodec {
    type Item = Vec<u8>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, io::Error> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    src.advance(end + 1);
                    self.next_index = 0;
                    self.discarding = false;
                }
                (true, None) => {
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(end)) if end > self.max_len => {
                    warn!(length = end, max = self.max_len, "Dropping oversized envelope line");
                    src.advance(end + 1);
                    self.next_index = 0;
                }
                (false, Some(end)) => {
                    self.next_index = 0;
                    return Ok(Some(Self::take_line(src, end)));
                }
                (false, None) if src.len() > self.max_len => {
                    warn!(max = self.max_len, "Dropping oversized envelope line");
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                    return Ok(None);
                }
                (false, None) => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, io::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if self.discarding || src.is_empty() {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        // Final line without a trailing newline.
        let line = src.split().to_vec();
        Ok(Some(line))
    }
}
