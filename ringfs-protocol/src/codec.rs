//! Framing for the node protocol.
//!
//! [`NodeCodec`] turns a byte stream into header messages and payload
//! blocks. After a header that announces a payload the decoder hands out the
//! payload in blocks of at most [`MAX_PAYLOAD_BLOCK`] bytes until the
//! announced length is consumed, so neither side has to hold a whole blob in
//! memory.

use bytes::{Bytes, BytesMut};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::message::{Message, Request, Response};

/// Longest accepted header line, newline excluded
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Largest payload block yielded by the decoder
pub const MAX_PAYLOAD_BLOCK: usize = 64 * 1024;

/// A decoded or to-be-encoded unit of traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<M> {
    Message(M),
    Payload(Bytes),
}

/// Codec decoding `In` headers and encoding `Out` headers
#[derive(Debug)]
pub struct NodeCodec<In, Out> {
    max_line_length: usize,
    /// Bytes of the buffer already scanned for a newline
    next_index: usize,
    /// Payload bytes still expected after the last header
    payload_remaining: u64,
    _marker: PhantomData<fn(Out) -> In>,
}

/// Codec used by storage nodes: reads requests, writes responses
pub type ServerCodec = NodeCodec<Request, Response>;

/// Codec used by clients: reads responses, writes requests
pub type ClientCodec = NodeCodec<Response, Request>;

impl<In, Out> NodeCodec<In, Out> {
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
            payload_remaining: 0,
            _marker: PhantomData,
        }
    }

    /// Payload bytes the decoder still expects before the next header
    pub fn payload_remaining(&self) -> u64 {
        self.payload_remaining
    }
}

impl<In, Out> Default for NodeCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: Message, Out> NodeCodec<In, Out> {
    fn decode_payload(&mut self, src: &mut BytesMut) -> Option<Frame<In>> {
        if src.is_empty() {
            return None;
        }
        let take = src
            .len()
            .min(MAX_PAYLOAD_BLOCK)
            .min(usize::try_from(self.payload_remaining).unwrap_or(usize::MAX));
        self.payload_remaining -= take as u64;
        Some(Frame::Payload(src.split_to(take).freeze()))
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<Frame<In>>> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        let end = match newline {
            Some(offset) => self.next_index + offset,
            None if src.len() > self.max_line_length => {
                return Err(ProtocolError::LineTooLong {
                    limit: self.max_line_length,
                })
            }
            None => {
                self.next_index = src.len();
                return Ok(None);
            }
        };

        self.next_index = 0;
        let raw = src.split_to(end + 1);
        let mut line = &raw[..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if line.len() > self.max_line_length {
            return Err(ProtocolError::LineTooLong {
                limit: self.max_line_length,
            });
        }

        let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
        let message = In::parse_line(text)?;
        if let Some(length) = message.payload_len() {
            self.payload_remaining = length;
        }
        trace!("Decoded header {:?}", text);

        Ok(Some(Frame::Message(message)))
    }
}

impl<In: Message, Out> Decoder for NodeCodec<In, Out> {
    type Item = Frame<In>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.payload_remaining > 0 {
            return Ok(self.decode_payload(src));
        }
        self.decode_line(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.payload_remaining > 0 {
            return Err(ProtocolError::Truncated {
                missing: self.payload_remaining,
            });
        }
        if src.is_empty() {
            Ok(None)
        } else {
            Err(ProtocolError::UnterminatedLine)
        }
    }
}

impl<In, Out: Message> Encoder<Frame<Out>> for NodeCodec<In, Out> {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame<Out>, dst: &mut BytesMut) -> Result<()> {
        match item {
            Frame::Message(message) => message.write_line(dst),
            Frame::Payload(bytes) => dst.extend_from_slice(&bytes),
        }
        Ok(())
    }
}
