//! CRLF line framing for tokio.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::IrcError;

/// Longest inbound line accepted, tags included (IRCv3 allows 8191).
pub const MAX_INBOUND_LINE: usize = 8191;

/// Line codec for the IRC byte stream.
///
/// Inbound bytes are decoded lossily so a server relaying Latin-1 text
/// cannot tear the connection down. Outbound lines get `\r\n` appended.
#[derive(Debug)]
pub struct IrcCodec {
    /// Index of the next byte to scan for `\n`.
    next_index: usize,
    max_len: usize,
}

impl IrcCodec {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_INBOUND_LINE,
        }
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = String;
    type Error = IrcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, IrcError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_len {
                    return Err(IrcError::LineTooLong { max: self.max_len });
                }
                return Ok(None);
            };

            let raw = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if raw.len() > self.max_len {
                return Err(IrcError::LineTooLong { max: self.max_len });
            }

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            // Blank keep-alive lines carry nothing to dispatch.
            if !line.is_empty() {
                return Ok(Some(line.to_owned()));
            }
        }
    }
}

impl Encoder<String> for IrcCodec {
    type Error = IrcError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), IrcError> {
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
