//! Streaming frame codec for `tokio_util::codec::Framed`.
//!
//! The decoder yields raw, still-stuffed frames (`C0 .. C0`). A frame split
//! across reads stays buffered until its closing delimiter arrives.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::command::CommandFrame;
use crate::frame::{self, DELIMITER};

/// Largest partial frame kept while waiting for its closing delimiter.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct FanCodec {}

impl FanCodec {
    pub fn new() -> Self {
        Self {}
    }
}

impl Decoder for FanCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some((start, end)) = frame::next_frame_bounds(src) {
            src.advance(start);
            let raw = src.split_to(end - start + 1).freeze();
            return Ok(Some(raw));
        }

        // nothing complete; drop noise ahead of the last opening delimiter
        match src.iter().rposition(|&b| b == DELIMITER) {
            Some(start) => src.advance(start),
            None => src.clear(),
        }

        if src.len() > MAX_FRAME_SIZE {
            warn!(len = src.len(), "partial frame exceeds size limit, discarding");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<CommandFrame> for FanCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: CommandFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
