// src/wire/chunk.rs
//
// File chunks: the binary half of the protocol.
//
// The transfer id rides at the front of the payload so the relay can route a
// chunk after reading only the short prefix — the data bytes are forwarded
// untouched and uninspected. The id uses a u16 length prefix in the style of
// length-prefixed modified-UTF-8 strings.

use bytes::{BufMut, Bytes, BytesMut};

use super::WireError;

/// One slice of an in-flight file transfer.
///
/// `seq` is assigned by the sender starting at 0 and is informational: the
/// relay never reorders, so it arrives monotonic. The receiver may use it for
/// progress reporting or sanity checks.
#[derive(Debug, Clone, PartialEq)]
pub struct FileChunk {
    pub transfer_id: String,
    pub seq: i32,
    pub data: Bytes,
}

impl FileChunk {
    /// Encode into a FileChunk frame payload.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let id = self.transfer_id.as_bytes();
        if id.len() > u16::MAX as usize {
            return Err(WireError::TransferIdTooLong(id.len()));
        }

        let mut buf = BytesMut::with_capacity(2 + id.len() + 8 + self.data.len());
        buf.put_u16(id.len() as u16);
        buf.put_slice(id);
        buf.put_i32(self.seq);
        buf.put_i32(self.data.len() as i32);
        buf.put_slice(&self.data);
        Ok(buf.freeze())
    }

    /// Decode a FileChunk frame payload.
    pub fn decode(payload: &[u8]) -> Result<FileChunk, WireError> {
        if payload.len() < 2 {
            return Err(WireError::Truncated {
                needed: 2,
                available: payload.len(),
            });
        }
        let id_len = u16::from_be_bytes(payload[0..2].try_into().unwrap()) as usize;

        let header_len = 2 + id_len + 8;
        if payload.len() < header_len {
            return Err(WireError::Truncated {
                needed: header_len,
                available: payload.len(),
            });
        }

        let transfer_id = std::str::from_utf8(&payload[2..2 + id_len])?.to_string();
        let seq = i32::from_be_bytes(payload[2 + id_len..2 + id_len + 4].try_into().unwrap());
        let data_len =
            i32::from_be_bytes(payload[2 + id_len + 4..header_len].try_into().unwrap());
        if data_len < 0 {
            return Err(WireError::NegativeLength(data_len));
        }

        let data = &payload[header_len..];
        if data.len() != data_len as usize {
            return Err(WireError::LengthMismatch {
                declared: data_len as usize,
                actual: data.len(),
            });
        }

        Ok(FileChunk {
            transfer_id,
            seq,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// Extract only the transfer id from an encoded payload.
    ///
    /// This is the relay's routing read: the rest of the payload is never
    /// parsed on the server, just re-enqueued byte-for-byte.
    pub fn peek_transfer_id(payload: &[u8]) -> Result<&str, WireError> {
        if payload.len() < 2 {
            return Err(WireError::Truncated {
                needed: 2,
                available: payload.len(),
            });
        }
        let id_len = u16::from_be_bytes(payload[0..2].try_into().unwrap()) as usize;
        if payload.len() < 2 + id_len {
            return Err(WireError::Truncated {
                needed: 2 + id_len,
                available: payload.len(),
            });
        }
        Ok(std::str::from_utf8(&payload[2..2 + id_len])?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
