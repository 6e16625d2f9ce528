//! WebSocket Frame Codec
//!
//! Encodes and decodes single WebSocket frames over an async byte stream.
//!
//! - Outbound frames are always one unfragmented, unmasked text frame.
//! - Inbound frames are expected to be masked (client to server). Every
//!   complete non-close frame is returned as a standalone text message;
//!   fragments are not reassembled.
//!
//! Any decode failure is terminal for the connection. The codec never tries
//! to resynchronize a corrupted stream.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// FIN bit of the first header byte.
pub const FIN_BIT: u8 = 0x80;
/// MASK bit of the second header byte.
pub const MASK_BIT: u8 = 0x80;
/// Text frame opcode.
pub const OPCODE_TEXT: u8 = 0x1;
/// Close frame opcode.
pub const OPCODE_CLOSE: u8 = 0x8;

/// Largest length that fits the 7-bit length field.
const MAX_SHORT_LEN: usize = 125;
/// Marker for a 16-bit extended length.
const LEN_MARKER_16: u8 = 126;
/// Marker for a 64-bit extended length.
const LEN_MARKER_64: u8 = 127;

/// Frame decode errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the stream or sent a close frame.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Frame ended before its header or payload was complete.
    #[error("Malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// Underlying transport failed.
    #[error("Transport error: {0}")]
    Io(#[from] io::Error),
}

/// Encode `payload` as a single FIN text frame.
pub fn encode_text_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 10);
    frame.push(FIN_BIT | OPCODE_TEXT);

    if len <= MAX_SHORT_LEN {
        frame.push(len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(LEN_MARKER_16);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(LEN_MARKER_64);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

/// Encode `payload` as a text frame, write it and flush.
pub async fn write_text_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_text_frame(payload);
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// XOR `payload` in place with the 4-byte mask key.
///
/// Applying the same key twice restores the original bytes.
#[inline]
pub fn apply_mask(payload: &mut [u8], mask_key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
}

/// Read one client frame and return its unmasked text payload.
///
/// The 127 length marker honors only the trailing 16 bits of the 64-bit
/// length field; the leading 6 bytes are read and discarded.
pub async fn read_frame<R>(reader: &mut R) -> Result<String, FrameError>
where
    R: AsyncRead + Unpin,
{
    let first = match reader.read_u8().await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(FrameError::Io(e)),
    };

    if first & 0x0F == OPCODE_CLOSE {
        return Err(FrameError::ConnectionClosed);
    }

    let mut byte = [0u8; 1];
    read_exact_or(reader, &mut byte, "truncated length").await?;

    let payload_len = match byte[0] & 0x7F {
        LEN_MARKER_16 => {
            let mut len = [0u8; 2];
            read_exact_or(reader, &mut len, "truncated 16-bit length").await?;
            u16::from_be_bytes(len) as usize
        }
        LEN_MARKER_64 => {
            let mut ignored = [0u8; 6];
            read_exact_or(reader, &mut ignored, "truncated 64-bit length").await?;
            let mut len = [0u8; 2];
            read_exact_or(reader, &mut len, "truncated 64-bit length").await?;
            u16::from_be_bytes(len) as usize
        }
        short => short as usize,
    };

    let mut mask_key = [0u8; 4];
    read_exact_or(reader, &mut mask_key, "truncated mask key").await?;

    let mut payload = vec![0u8; payload_len];
    read_exact_or(reader, &mut payload, "truncated payload").await?;

    apply_mask(&mut payload, mask_key);

    Ok(match String::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

async fn read_exact_or<R>(reader: &mut R, buf: &mut [u8], what: &'static str) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FrameError::MalformedFrame(what)),
        Err(e) => Err(FrameError::Io(e)),
    }
}
