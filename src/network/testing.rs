//! Minimal raw WebSocket client used by the session and server tests.

use std::time::Duration;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::network::frame::{apply_mask, encode_text_frame, FIN_BIT, MASK_BIT, OPCODE_CLOSE};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const MASK: [u8; 4] = [0xa1, 0x0b, 0x5c, 0xe7];

pub(crate) const UPGRADE_REQUEST: &str = "GET / HTTP/1.1\r\n\
    Host: localhost\r\n\
    Upgrade: websocket\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Version: 13\r\n\r\n";

/// Client that speaks just enough of the protocol to drive the server.
pub(crate) struct RawClient<S> {
    stream: BufReader<S>,
}

impl<S> RawClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self { stream: BufReader::new(stream) }
    }

    /// Send the upgrade request and return the response head.
    pub(crate) async fn handshake(&mut self) -> String {
        self.stream.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();
        self.stream.flush().await.unwrap();
        self.read_response_head().await
    }

    pub(crate) async fn read_response_head(&mut self) -> String {
        let mut head = String::new();
        loop {
            let mut line = String::new();
            let n = timeout(RECV_TIMEOUT, self.stream.read_line(&mut line)).await.unwrap().unwrap();
            head.push_str(&line);
            if n == 0 || line == "\r\n" {
                return head;
            }
        }
    }

    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Send a masked text frame.
    pub(crate) async fn send_text(&mut self, text: &str) {
        let server_frame = encode_text_frame(text.as_bytes());
        let header_len = match server_frame[1] {
            126 => 4,
            127 => 10,
            _ => 2,
        };

        let mut frame = server_frame[..header_len].to_vec();
        frame[1] |= MASK_BIT;
        frame.extend_from_slice(&MASK);
        let mut payload = server_frame[header_len..].to_vec();
        apply_mask(&mut payload, MASK);
        frame.extend_from_slice(&payload);

        self.send_raw(&frame).await;
    }

    pub(crate) async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    pub(crate) async fn send_close(&mut self) {
        self.send_raw(&[FIN_BIT | OPCODE_CLOSE, MASK_BIT, 0, 0, 0, 0]).await;
    }

    /// Read one unmasked server text frame.
    pub(crate) async fn recv_text(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.read_frame()).await.expect("timed out waiting for frame")
    }

    pub(crate) async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv_text().await).unwrap()
    }

    /// Skip frames until one with the given `type` arrives.
    pub(crate) async fn recv_type(&mut self, message_type: &str) -> Value {
        loop {
            let value = self.recv_json().await;
            if value["type"] == message_type {
                return value;
            }
        }
    }

    /// Check that nothing arrives within `wait`.
    pub(crate) async fn expect_silence(&mut self, wait: Duration) {
        let mut byte = [0u8; 1];
        assert!(timeout(wait, self.stream.read_exact(&mut byte)).await.is_err());
    }

    /// Check that the server closes the stream.
    pub(crate) async fn expect_eof(&mut self) {
        let mut buf = [0u8; 64];
        let n = timeout(RECV_TIMEOUT, self.stream.read(&mut buf)).await.unwrap().unwrap_or(0);
        assert_eq!(n, 0);
    }

    async fn read_frame(&mut self) -> String {
        let first = self.stream.read_u8().await.unwrap();
        assert_eq!(first, FIN_BIT | 0x1);

        let len = match self.stream.read_u8().await.unwrap() {
            126 => self.stream.read_u16().await.unwrap() as usize,
            127 => self.stream.read_u64().await.unwrap() as usize,
            n => n as usize,
        };

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await.unwrap();
        String::from_utf8(payload).unwrap()
    }
}
