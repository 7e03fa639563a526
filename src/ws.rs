//! RFC 6455 WebSocket frame codec, handshake, and session driver.
//!
//! The codec (`OpCode`, `encode_frame`, `decode_head`) is pure and
//! allocation-free apart from the caller-supplied output buffer; it mirrors
//! the flat byte-slice parsing style used by [`http::request`](crate::http::request)
//! and [`http::chunked`](crate::http::chunked). [`WsSession`] drives that codec
//! over a live [`TcpStream`], assembling fragmented messages, answering Ping/Close
//! control frames, and enforcing the configured payload-size and liveness limits.

use crate::limits::WsLimits;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::io;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
///
/// `key` is the raw header value (already trimmed of surrounding whitespace).
#[inline]
pub fn accept_key(key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(GUID);
    let digest = hasher.finalize();

    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// WebSocket frame opcodes (RFC 6455 Section 11.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    #[inline]
    fn from_raw(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    #[inline]
    const fn as_raw(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    #[inline]
    const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// A complete, reassembled WebSocket message delivered to the application.
#[derive(Debug, PartialEq, Eq)]
pub enum Message {
    /// A UTF-8 text message (validity is not re-checked by the session).
    Text(Vec<u8>),
    /// An arbitrary binary message.
    Binary(Vec<u8>),
}

/// A WebSocket close code, either one of the well-known RFC 6455 codes or an
/// application-defined value in the `3000..=4999` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: Self = Self(1000);
    pub const GOING_AWAY: Self = Self(1001);
    pub const PROTOCOL_ERROR: Self = Self(1002);
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    pub const INVALID_PAYLOAD: Self = Self(1007);
    pub const POLICY_VIOLATION: Self = Self(1008);
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    pub const INTERNAL_ERROR: Self = Self(1011);
}

/// An error occurring while driving an upgraded WebSocket connection.
#[derive(Debug, PartialEq)]
pub enum WsError {
    /// The underlying TCP stream failed.
    Io(io::ErrorKind),
    /// The peer violated RFC 6455 framing rules.
    Protocol(&'static str),
    /// A single read or write exceeded its deadline.
    Timeout,
    /// A frame or reassembled message exceeded [`WsLimits::max_payload_size`].
    TooLarge,
}

impl From<io::Error> for WsError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.kind())
    }
}

/// Serializes a single, unmasked server-to-client frame into `buffer`.
///
/// Per RFC 6455 Section 5.1, server frames MUST NOT be masked.
pub(crate) fn encode_frame(opcode: OpCode, fin: bool, payload: &[u8], buffer: &mut Vec<u8>) {
    buffer.push((fin as u8) << 7 | opcode.as_raw());

    match payload.len() {
        len @ 0..=125 => buffer.push(len as u8),
        len @ 126..=0xFFFF => {
            buffer.push(126);
            buffer.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            buffer.push(127);
            buffer.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }

    buffer.extend_from_slice(payload);
}

/// The fixed-size part of a frame header, once length and mask key are known.
struct FrameHead {
    fin: bool,
    opcode: OpCode,
    masked: bool,
    mask: [u8; 4],
    payload_len: usize,
}

/// State for assembling a fragmented message across multiple frames.
enum Assembly {
    Idle,
    InProgress { opcode: OpCode, payload: Vec<u8> },
}

/// A live WebSocket connection, taken over from the HTTP engine after a
/// successful handshake (status 101).
///
/// Owns no buffers beyond a small fixed header scratch area; message payloads
/// are allocated on demand and bounded by [`WsLimits::max_payload_size`].
pub struct WsSession<'a> {
    stream: &'a mut TcpStream,
    limits: WsLimits,
    assembly: Assembly,
    closed: bool,
}

impl<'a> WsSession<'a> {
    #[inline]
    pub(crate) fn new(stream: &'a mut TcpStream, limits: WsLimits) -> Self {
        Self {
            stream,
            limits,
            assembly: Assembly::Idle,
            closed: false,
        }
    }

    /// Receives the next complete application message.
    ///
    /// Transparently answers `Ping` with `Pong`, accepts `Pong` as a liveness
    /// signal, and handles the `Close` handshake (echoing the peer's code,
    /// closing the TCP connection, and returning `None`). A receive timeout
    /// of half the session's configured interval triggers a server-initiated
    /// `Ping`; total silence past the full interval closes the session with
    /// code 1000, per Section 4.7 of the protocol engine design.
    pub async fn recv(&mut self) -> Result<Option<Message>, WsError> {
        if self.closed {
            return Ok(None);
        }

        loop {
            let head = match self.read_head_with_liveness().await {
                Ok(Some(head)) => head,
                Ok(None) => {
                    self.close(CloseCode::NORMAL, b"").await.ok();
                    return Ok(None);
                }
                // `read_head` surfaces protocol violations (reserved bits, bad
                // opcode, unmasked frame, oversized payload) as a bare `Err`
                // before any frame content is read -- close the wire with the
                // matching code here instead of letting them propagate mute.
                Err(err) => {
                    let (code, reason): (CloseCode, &'static str) = match &err {
                        WsError::TooLarge => (CloseCode::MESSAGE_TOO_BIG, "payload too large"),
                        WsError::Protocol(reason) => (CloseCode::PROTOCOL_ERROR, *reason),
                        WsError::Io(_) | WsError::Timeout => {
                            (CloseCode::INTERNAL_ERROR, "connection error")
                        }
                    };
                    self.close(code, reason.as_bytes()).await.ok();
                    return Err(err);
                }
            };

            let mut frame_payload = vec![0u8; head.payload_len];
            self.stream.read_exact(&mut frame_payload).await?;
            if head.masked {
                unmask(&mut frame_payload, head.mask);
            }

            match head.opcode {
                OpCode::Ping => {
                    if frame_payload.len() > 125 {
                        return self.fail(CloseCode::PROTOCOL_ERROR, "oversized ping").await;
                    }
                    self.write_control(OpCode::Pong, &frame_payload).await?;
                }
                OpCode::Pong => continue,
                OpCode::Close => {
                    let code = match frame_payload.len() {
                        0 => CloseCode::NORMAL,
                        1 => return self.fail(CloseCode::PROTOCOL_ERROR, "truncated close").await,
                        _ => CloseCode(u16::from_be_bytes([frame_payload[0], frame_payload[1]])),
                    };
                    self.close(code, b"").await.ok();
                    return Ok(None);
                }
                OpCode::Text | OpCode::Binary => {
                    if !head.fin {
                        if !matches!(self.assembly, Assembly::Idle) {
                            return self
                                .fail(CloseCode::PROTOCOL_ERROR, "unexpected start")
                                .await;
                        }
                        self.assembly = Assembly::InProgress {
                            opcode: head.opcode,
                            payload: frame_payload,
                        };
                        continue;
                    }
                    if !matches!(self.assembly, Assembly::Idle) {
                        return self
                            .fail(CloseCode::PROTOCOL_ERROR, "unexpected start")
                            .await;
                    }
                    return Ok(Some(Self::to_message(head.opcode, frame_payload)));
                }
                OpCode::Continuation => match std::mem::replace(&mut self.assembly, Assembly::Idle)
                {
                    Assembly::Idle => {
                        return self
                            .fail(CloseCode::PROTOCOL_ERROR, "unexpected continuation")
                            .await
                    }
                    Assembly::InProgress {
                        opcode,
                        mut payload,
                    } => {
                        if payload.len() + frame_payload.len() > self.limits.max_payload_size {
                            return self.fail(CloseCode::MESSAGE_TOO_BIG, "message too large").await;
                        }
                        payload.extend_from_slice(&frame_payload);

                        if !head.fin {
                            self.assembly = Assembly::InProgress { opcode, payload };
                            continue;
                        }

                        return Ok(Some(Self::to_message(opcode, payload)));
                    }
                },
            }
        }
    }

    fn to_message(opcode: OpCode, payload: Vec<u8>) -> Message {
        match opcode {
            OpCode::Text => Message::Text(payload),
            _ => Message::Binary(payload),
        }
    }

    async fn fail(&mut self, code: CloseCode, reason: &'static str) -> Result<Option<Message>, WsError> {
        self.close(code, reason.as_bytes()).await.ok();
        Err(WsError::Protocol(reason))
    }

    async fn read_head_with_liveness(&mut self) -> Result<Option<FrameHead>, WsError> {
        let ping_interval = self.limits.liveness_interval;
        match timeout(ping_interval, self.read_head()).await {
            Ok(result) => result.map(Some),
            Err(_) => {
                self.write_control(OpCode::Ping, b"").await?;
                match timeout(ping_interval, self.read_head()).await {
                    Ok(result) => result.map(Some),
                    Err(_) => Ok(None),
                }
            }
        }
    }

    async fn read_head(&mut self) -> Result<FrameHead, WsError> {
        let mut base = [0u8; 2];
        self.stream.read_exact(&mut base).await?;

        let fin = base[0] & 0x80 != 0;
        if base[0] & 0x70 != 0 {
            // RSV1-3 are only meaningful with a negotiated extension; none is supported.
            return Err(WsError::Protocol("reserved bits set"));
        }
        let opcode = OpCode::from_raw(base[0] & 0x0F).ok_or(WsError::Protocol("bad opcode"))?;
        let masked = base[1] & 0x80 != 0;
        let len_indicator = base[1] & 0x7F;

        if !masked {
            // RFC 6455 §5.1: all client-to-server frames MUST be masked.
            return Err(WsError::Protocol("unmasked client frame"));
        }

        if opcode.is_control() && !fin {
            return Err(WsError::Protocol("fragmented control frame"));
        }

        let payload_len = match len_indicator {
            126 => {
                let mut buf = [0u8; 2];
                self.stream.read_exact(&mut buf).await?;
                u16::from_be_bytes(buf) as usize
            }
            127 => {
                let mut buf = [0u8; 8];
                self.stream.read_exact(&mut buf).await?;
                u64::from_be_bytes(buf) as usize
            }
            n => n as usize,
        };

        if payload_len > self.limits.max_payload_size {
            return Err(WsError::TooLarge);
        }

        let mut mask = [0u8; 4];
        if masked {
            self.stream.read_exact(&mut mask).await?;
        }

        Ok(FrameHead {
            fin,
            opcode,
            masked,
            mask,
            payload_len,
        })
    }

    /// Sends a complete, unfragmented text message.
    pub async fn send_text(&mut self, payload: &[u8]) -> Result<(), WsError> {
        self.write_frame(OpCode::Text, payload).await
    }

    /// Sends a complete, unfragmented binary message.
    pub async fn send_binary(&mut self, payload: &[u8]) -> Result<(), WsError> {
        self.write_frame(OpCode::Binary, payload).await
    }

    async fn write_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), WsError> {
        let mut buffer = Vec::with_capacity(payload.len() + 10);
        encode_frame(opcode, true, payload, &mut buffer);
        self.stream.write_all(&buffer).await?;
        Ok(())
    }

    async fn write_control(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), WsError> {
        self.write_frame(opcode, payload).await
    }

    /// Sends a `Close` frame with `code` and `reason`, then shuts down the
    /// write half of the TCP connection. Idempotent.
    pub async fn close(&mut self, code: CloseCode, reason: &[u8]) -> Result<(), WsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.0.to_be_bytes());
        payload.extend_from_slice(reason);

        self.write_frame(OpCode::Close, &payload).await?;
        let _ = self.stream.shutdown().await;
        Ok(())
    }
}

#[inline]
fn unmask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Validates the request headers required for a WebSocket handshake
/// (`Upgrade: websocket`, `Connection: upgrade`, `Sec-WebSocket-Key` present).
pub fn is_upgrade_request(upgrade: Option<&[u8]>, connection: Option<&[u8]>) -> bool {
    let upgrade_ok = upgrade.is_some_and(|v| v.eq_ignore_ascii_case(b"websocket"));
    let connection_ok = connection.is_some_and(|v| {
        v.split(|&b| b == b',')
            .any(|tok| trim_ascii_whitespace(tok).eq_ignore_ascii_case(b"upgrade"))
    });

    upgrade_ok && connection_ok
}

/// `[u8]::trim_ascii` isn't available on this crate's MSRV; same semantics.
#[inline]
fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace());
    let Some(start) = start else { return &[] };
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).unwrap();
    &bytes[start..=end]
}
