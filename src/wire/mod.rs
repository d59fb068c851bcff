// src/wire/mod.rs
//
// Wire format for the chat protocol
//
// Everything on the socket is a length-prefixed frame. A frame carries either
// a JSON control packet or a binary file chunk; the two interleave freely on
// one TCP stream, which is why explicit framing exists at all — the reader
// must never confuse a chunk's payload byte for the next frame's length.
//
// All integer fields are big-endian. Layouts:
//
//   frame:  u8 type | i32 length | payload[length]
//   packet: i32 length (= 8 + |body|) | i32 typeCode | UTF-8 JSON body
//   chunk:  u16 id-len | transferId UTF-8 | i32 seq | i32 len | data[len]

pub mod chunk;
pub mod frame;
pub mod packet;

pub use chunk::FileChunk;
pub use frame::{read_frame, write_frame, FrameType};
pub use packet::{Packet, PacketType};

/// Hard cap on a single frame's payload. A peer declaring more than this is
/// corrupted or hostile; the connection is torn down.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

/// Errors arising while reading or writing wire-format data.
///
/// Every variant except `Io` is a protocol violation: the byte stream can no
/// longer be trusted and the connection must be closed. `Io` covers EOF and
/// truncated reads/writes from the transport itself.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown frame type byte: 0x{0:02x}")]
    UnknownFrameType(u8),

    #[error("unknown packet type code: {0}")]
    UnknownPacketCode(i32),

    #[error("negative length field: {0}")]
    NegativeLength(i32),

    #[error("frame payload of {0} bytes exceeds maximum {MAX_FRAME_LEN}")]
    FrameTooLarge(usize),

    #[error("declared length {declared} does not match actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("truncated payload: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("transfer id of {0} bytes exceeds u16 length prefix")]
    TransferIdTooLong(usize),

    #[error("transfer id is not valid UTF-8")]
    InvalidTransferId(#[from] std::str::Utf8Error),

    #[error("malformed packet body: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// True for violations of the wire format itself, as opposed to transport
    /// failures. Both are fatal to a session; only logging differs.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, WireError::Io(_))
    }
}
