//! Line-delimited JSON over a byte stream, stdin/stdout in the daemon.
//!
//! Each input line is one envelope. Published envelopes are written as
//! `<channel>\t<json>`, which a broker bridge can split on the first tab.

use super::Transport;
use super::codec::RawLineCodec;
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::warn;

/// Longest envelope line accepted on input.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Envelope lines in from `R`, published lines out to `W`.
pub struct LineTransport<R, W> {
    reader: Mutex<FramedRead<R, RawLineCodec>>,
    writer: Mutex<FramedWrite<W, LinesCodec>>,
}

/// The daemon's transport.
pub type StdioTransport = LineTransport<Stdin, Stdout>;

impl StdioTransport {
    pub fn new() -> Self {
        Self::from_parts(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self::with_max_line_length(reader, writer, MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(reader: R, writer: W, max_len: usize) -> Self {
        Self {
            reader: Mutex::new(FramedRead::new(reader, RawLineCodec::with_max_len(max_len))),
            writer: Mutex::new(FramedWrite::new(writer, LinesCodec::new())),
        }
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&self) -> Option<Vec<u8>> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await? {
                Ok(line) if line.trim_ascii().is_empty() => continue,
                Ok(line) => return Some(line),
                Err(e) => {
                    warn!(error = %e, "Input read failed, closing transport");
                    return None;
                }
            }
        }
    }

    async fn publish(&self, channel: &str, raw: Vec<u8>) -> Result<(), TransportError> {
        let body = String::from_utf8_lossy(&raw);
        self.writer
            .lock()
            .await
            .send(format!("{channel}\t{body}"))
            .await?;
        Ok(())
    }
}
