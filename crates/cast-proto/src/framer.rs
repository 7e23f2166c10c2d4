//! Streaming frame reassembly for the control channel.

use bytes::{Buf, Bytes, BytesMut};
use cast_core::CodecError;

use crate::envelope::{self, ControlEnvelope, LENGTH_PREFIX_LEN};

/// Largest frame body a receiver will send.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Re-entrant frame decoder.
///
/// Bytes are appended as they arrive; complete frames are yielded in the
/// order their length prefixes complete. A single read may carry a partial
/// frame, exactly one frame, or several.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Bytes still to drop from an oversized frame.
    discard: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes buffered but not yet yielded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete frame body, or `None` if more bytes are needed.
    ///
    /// An oversized frame yields one `MalformedEnvelope` error and its bytes
    /// are dropped as they arrive; later frames decode normally.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, CodecError> {
        if self.discard > 0 {
            let n = self.discard.min(self.buf.len());
            self.buf.advance(n);
            self.discard -= n;
            if self.discard > 0 {
                return Ok(None);
            }
        }

        if self.buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let declared =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;

        if declared > MAX_FRAME_LEN {
            self.buf.advance(LENGTH_PREFIX_LEN);
            self.discard = declared;
            let n = self.discard.min(self.buf.len());
            self.buf.advance(n);
            self.discard -= n;
            return Err(CodecError::MalformedEnvelope(format!(
                "frame declares {} bytes, limit is {}",
                declared, MAX_FRAME_LEN
            )));
        }

        if self.buf.len() < LENGTH_PREFIX_LEN + declared {
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_LEN);
        Ok(Some(self.buf.split_to(declared).freeze()))
    }

    /// Take and decode the next complete frame.
    ///
    /// A frame that fails to decode is consumed, so the caller can log the
    /// error and keep draining.
    pub fn next_envelope(&mut self) -> Result<Option<ControlEnvelope>, CodecError> {
        match self.next_frame()? {
            Some(body) => envelope::decode_body(&body).map(Some),
            None => Ok(None),
        }
    }
}
