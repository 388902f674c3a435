// Transport framing with length and CRC32
//
// TCP hands back a byte stream, so one write is never guaranteed to be
// one read. Every protocol message rides in exactly one frame:
//
// [4 bytes] length (BE u32) - type byte + payload, NOT length/CRC
// [1 byte]  frame_type
// [N bytes] payload
// [4 bytes] CRC32 (LE) over length + type + payload

use crc32fast::Hasher;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard cap on a single frame. Layered envelopes grow multiplicatively
/// per hop, so this is generous, but a stream claiming more is broken or
/// hostile and gets dropped before allocation.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Length prefix of zero or above [`MAX_FRAME_BYTES`].
    #[error("invalid frame length: {0} bytes")]
    BadLength(usize),
    /// Unknown frame type byte.
    #[error("invalid frame type: {0:#04x}")]
    InvalidType(u8),
    /// CRC32 over length + type + payload did not match.
    #[error("frame CRC32 mismatch")]
    CrcMismatch,
    #[error("frame I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// A sealed onion envelope in wire form (0x01)
    Envelope = 0x01,
    /// Directory command: GET_ROUTERS or REGISTER_ROUTER (0x02)
    DirectoryRequest = 0x02,
    /// Directory reply: router list JSON, OK, or an error string (0x03)
    DirectoryResponse = 0x03,
    /// Terminal plaintext handed to a destination (0x04)
    Delivery = 0x04,
    /// Fixed acknowledgement from a destination (0x05)
    Ack = 0x05,
    /// Human-readable error string (0x06)
    Error = 0x06,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x01 => Ok(FrameType::Envelope),
            0x02 => Ok(FrameType::DirectoryRequest),
            0x03 => Ok(FrameType::DirectoryResponse),
            0x04 => Ok(FrameType::Delivery),
            0x05 => Ok(FrameType::Ack),
            0x06 => Ok(FrameType::Error),
            other => Err(FrameError::InvalidType(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// One framed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    /// Payload as text; all protocol payloads are UTF-8 strings.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Write one complete frame and flush.
pub async fn write_frame<S>(stream: &mut S, frame: &Frame) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    let length = 1 + frame.payload.len();
    if length > MAX_FRAME_BYTES {
        return Err(FrameError::BadLength(length));
    }

    let mut buf = Vec::with_capacity(4 + length + 4);
    buf.extend_from_slice(&(length as u32).to_be_bytes());
    buf.push(frame.frame_type.as_u8());
    buf.extend_from_slice(&frame.payload);

    let mut hasher = Hasher::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());

    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

/// Read exactly one frame, verifying length bounds and the CRC32.
pub async fn read_frame<S>(stream: &mut S) -> Result<Frame, FrameError>
where
    S: AsyncRead + Unpin,
{
    let length = stream.read_u32().await? as usize;
    if length == 0 || length > MAX_FRAME_BYTES {
        return Err(FrameError::BadLength(length));
    }

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await?;
    let received_crc = stream.read_u32_le().await?;

    let mut hasher = Hasher::new();
    hasher.update(&(length as u32).to_be_bytes());
    hasher.update(&body);
    if hasher.finalize() != received_crc {
        return Err(FrameError::CrcMismatch);
    }

    let frame_type = FrameType::from_u8(body[0])?;
    Ok(Frame {
        frame_type,
        payload: body[1..].to_vec(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
