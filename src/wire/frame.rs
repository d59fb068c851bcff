// src/wire/frame.rs
//
// Frame envelope: the atomic unit on the socket.
//
// A read either yields a complete frame or fails; callers never see a half
// frame. Write atomicity is NOT enforced here — it comes from the
// single-writer discipline in net::connection, which guarantees only one
// task ever calls write_frame on a given socket.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{WireError, MAX_FRAME_LEN};

/// Tag byte identifying what a frame's payload contains.
///
/// `FileControl` and `Heartbeat` are reserved: they decode cleanly so an
/// older peer never kills the connection over them, but nothing produces or
/// dispatches them today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    JsonPacket = 0x01,
    FileChunk = 0x02,
    FileControl = 0x03,
    Heartbeat = 0x04,
}

impl TryFrom<u8> for FrameType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameType::JsonPacket),
            0x02 => Ok(FrameType::FileChunk),
            0x03 => Ok(FrameType::FileControl),
            0x04 => Ok(FrameType::Heartbeat),
            other => Err(WireError::UnknownFrameType(other)),
        }
    }
}

/// Read one complete frame.
///
/// Fails with a protocol error on an unknown type byte, a negative length,
/// or a length beyond [`MAX_FRAME_LEN`]; fails with `Io` on EOF or a payload
/// cut short mid-read.
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameType, Bytes), WireError>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag).await?;
    let frame_type = FrameType::try_from(tag[0])?;

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let declared = i32::from_be_bytes(len_buf);
    if declared < 0 {
        return Err(WireError::NegativeLength(declared));
    }
    let len = declared as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok((frame_type, Bytes::from(payload)))
}

/// Write one complete frame: tag byte, big-endian length, payload, flush.
pub async fn write_frame<W>(
    writer: &mut W,
    frame_type: FrameType,
    payload: &[u8],
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    writer.write_u8(frame_type as u8).await?;
    writer.write_i32(payload.len() as i32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
