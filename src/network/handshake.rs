//! WebSocket Upgrade Handshake
//!
//! Reads the client's HTTP upgrade request line by line, derives the
//! `Sec-WebSocket-Accept` value and answers with `101 Switching Protocols`.
//! Runs exactly once per connection, before any frame is decoded.

use std::io;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Request header carrying the client key.
const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Upper bound on the request head, terminator included.
pub const MAX_REQUEST_BYTES: u64 = 8 * 1024;

/// Handshake errors. Nothing is written back on failure.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Request ended without a usable key header.
    #[error("Handshake failed: missing Sec-WebSocket-Key header")]
    MissingKey,

    /// Request head exceeded [`MAX_REQUEST_BYTES`].
    #[error("Handshake failed: request larger than {MAX_REQUEST_BYTES} bytes")]
    RequestTooLarge,

    /// Transport failed while reading the request or writing the response.
    #[error("Handshake failed: {0}")]
    Io(#[from] io::Error),
}

/// Compute the accept key for a client key.
pub fn derive_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Build the `101 Switching Protocols` response.
pub fn switching_protocols_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\r\n"
    )
}

/// Read the upgrade request and answer it.
///
/// Header lines are consumed up to the blank terminator line or end of
/// stream, reading at most [`MAX_REQUEST_BYTES`]. Anything buffered in `reader` past the terminator belongs to the
/// first frame, so the caller must keep decoding from the same reader.
///
/// Returns the accept key that was sent.
pub async fn negotiate<R, W>(reader: &mut R, writer: &mut W) -> Result<String, HandshakeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut client_key: Option<String> = None;
    let mut line = String::new();
    let mut head = (&mut *reader).take(MAX_REQUEST_BYTES);

    loop {
        line.clear();
        if head.read_line(&mut line).await? == 0 {
            if head.limit() == 0 {
                return Err(HandshakeError::RequestTooLarge);
            }
            break;
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }

        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case(KEY_HEADER) {
                client_key = Some(value.trim().to_string());
            }
        }
    }

    let client_key = match client_key {
        Some(key) if !key.is_empty() => key,
        _ => return Err(HandshakeError::MissingKey),
    };

    let accept_key = derive_accept_key(&client_key);
    writer.write_all(switching_protocols_response(&accept_key).as_bytes()).await?;
    writer.flush().await?;

    Ok(accept_key)
}
