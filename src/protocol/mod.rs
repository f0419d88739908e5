//! Wire protocol: framing and message catalog
//!
//! Every frame is `[id: u16 BE][body-length: u32 BE][body]`: a fixed
//! 6-byte header followed by the body. All multi-byte integers are
//! big-endian and embedded strings are NUL-terminated.
//!
//! Authenticated client requests prefix their body with `<token>\0`; the
//! remainder (possibly empty) is the original payload the handler sees.

pub mod message;

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Total header length: 2-byte id + 4-byte body length
pub const HEADER_LEN: usize = 6;

/// Upper bound accepted for a frame body; larger headers are a protocol fault
pub const MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame body of {len} bytes for message {id} exceeds the {max} byte limit")]
    OversizedBody { id: u16, len: u32, max: u32 },
}

/// A complete wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u16,
    pub body: Bytes,
}

impl Frame {
    pub fn new(id: u16, body: impl Into<Bytes>) -> Self {
        Frame {
            id,
            body: body.into(),
        }
    }

    pub fn empty(id: u16) -> Self {
        Frame {
            id,
            body: Bytes::new(),
        }
    }

    /// Encode header + body into a single buffer
    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        buffer.put_u16(self.id);
        buffer.put_u32(self.body.len() as u32);
        buffer.put_slice(&self.body);
        buffer.freeze()
    }
}

/// Pack a frame header into a 6-byte buffer
pub fn pack_header(buffer: &mut [u8; HEADER_LEN], id: u16, body_len: u32) {
    BigEndian::write_u16(&mut buffer[..2], id);
    BigEndian::write_u32(&mut buffer[2..], body_len);
}

/// Unpack `(id, body-length)` from a 6-byte header
pub fn unpack_header(buffer: &[u8; HEADER_LEN]) -> (u16, u32) {
    let id = BigEndian::read_u16(&buffer[..2]);
    let body_len = BigEndian::read_u32(&buffer[2..]);
    (id, body_len)
}

/// Split a NUL-terminated string off the front of a buffer
///
/// Returns the string and the bytes after the NUL.
pub fn take_cstr(buffer: &[u8]) -> Option<(&str, &[u8])> {
    let nul = buffer.iter().position(|&b| b == 0)?;
    let value = std::str::from_utf8(&buffer[..nul]).ok()?;
    Some((value, &buffer[nul + 1..]))
}

/// Split the token prefix off an authenticated body
pub fn split_token(body: &[u8]) -> Option<(&str, &[u8])> {
    take_cstr(body)
}

/// Prefix an original payload with a NUL-terminated token
pub fn wrap_with_token(token: &str, payload: &[u8]) -> Bytes {
    let mut buffer = BytesMut::with_capacity(token.len() + 1 + payload.len());
    buffer.put_slice(token.as_bytes());
    buffer.put_u8(0);
    buffer.put_slice(payload);
    buffer.freeze()
}

/// Incremental frame decoder robust to arbitrary TCP segmentation
///
/// Maintains a 6-byte header accumulation buffer and the body under
/// construction across `feed` calls; a chunk may contain part of a frame,
/// several frames, or both.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    header_buf: [u8; HEADER_LEN],
    header_len: usize,
    pending: Option<PendingBody>,
}

#[derive(Debug)]
struct PendingBody {
    id: u16,
    expected: usize,
    body: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of bytes, appending every completed frame to `out`
    pub fn feed(&mut self, mut chunk: &[u8], out: &mut Vec<Frame>) -> Result<(), ProtocolError> {
        while !chunk.is_empty() {
            if self.pending.is_none() {
                // accumulate header bytes
                let need = HEADER_LEN - self.header_len;
                let take = need.min(chunk.len());
                self.header_buf[self.header_len..self.header_len + take]
                    .copy_from_slice(&chunk[..take]);
                self.header_len += take;
                chunk = &chunk[take..];

                if self.header_len == HEADER_LEN {
                    let (id, body_len) = unpack_header(&self.header_buf);
                    self.header_len = 0;
                    if body_len > MAX_BODY_LEN {
                        return Err(ProtocolError::OversizedBody {
                            id,
                            len: body_len,
                            max: MAX_BODY_LEN,
                        });
                    }
                    if body_len == 0 {
                        out.push(Frame::empty(id));
                    } else {
                        self.pending = Some(PendingBody {
                            id,
                            expected: body_len as usize,
                            body: Vec::with_capacity(body_len as usize),
                        });
                    }
                }
                continue;
            }

            let pending = self.pending.as_mut().expect("pending body present");
            let need = pending.expected - pending.body.len();
            let take = need.min(chunk.len());
            pending.body.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];

            if pending.body.len() == pending.expected {
                let done = self.pending.take().expect("pending body present");
                out.push(Frame::new(done.id, done.body));
            }
        }
        Ok(())
    }
}
