//! wicket/src/protocol.rs
//! Minecraft packet framing: VarInt codec, length-prefixed frames, and the
//! handshake refinement.

use crate::error::{FrameError, SessionError};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Packet ID of the serverbound handshake.
pub const HANDSHAKE_TAG: i32 = 0x00;

/// Packet ID of the clientbound login disconnect.
pub const DISCONNECT_TAG: i32 = 0x00;

/// Upper bound on a declared frame or string length. 256 KiB is generous for
/// anything the handshake state can carry.
pub const MAX_FRAME_LEN: usize = 262144;

/// How long a kicked client gets to flush the disconnect message before the
/// socket disappears.
pub const KICK_GRACE: Duration = Duration::from_millis(10);

const VARINT_MAX_BYTES: u32 = 5;

/// Field layout of the handshake body, after the packet ID.
pub const HANDSHAKE_SCHEMA: &[FieldKind] = &[
    FieldKind::VarInt,        // protocol version
    FieldKind::Identifier,    // server address
    FieldKind::UnsignedShort, // server port
    FieldKind::VarInt,        // next state
];

/// One element of a packet's field schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    VarInt,
    UnsignedShort,
    Identifier,
}

/// A decoded field value, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    VarInt(i32),
    UnsignedShort(u16),
    Identifier(String),
}

/// An in-memory decoded frame: leading type tag plus typed fields. Lives for
/// one connection-handling invocation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub tag: i32,
    pub fields: Vec<FieldValue>,
}

impl Packet {
    /// Reads one length-prefixed frame from the stream and parses its body
    /// against `schema`. The whole body is buffered first, so truncation and
    /// trailing garbage are both detected against the declared length.
    pub async fn read<R>(stream: &mut R, schema: &[FieldKind]) -> Result<Self, FrameError>
    where
        R: AsyncReadExt + Unpin,
    {
        let declared = read_varint(stream).await?;
        let len = usize::try_from(declared).map_err(|_| FrameError::BadLength(declared))?;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::Oversize(len));
        }
        let mut frame = vec![0u8; len];
        stream.read_exact(&mut frame).await?;

        let mut body = Body { buf: &frame };
        let tag = body.varint()?;
        let mut fields = Vec::with_capacity(schema.len());
        for kind in schema {
            fields.push(match kind {
                FieldKind::VarInt => FieldValue::VarInt(body.varint()?),
                FieldKind::UnsignedShort => FieldValue::UnsignedShort(body.u16()?),
                FieldKind::Identifier => FieldValue::Identifier(body.string()?),
            });
        }
        if !body.buf.is_empty() {
            return Err(FrameError::TrailingBytes(body.buf.len()));
        }
        Ok(Packet { tag, fields })
    }

    /// Serializes the packet as a complete frame: fields in order, tag
    /// prefixed, total length prepended as a VarInt.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        write_varint(&mut body, self.tag);
        for field in &self.fields {
            match field {
                FieldValue::VarInt(v) => write_varint(&mut body, *v),
                FieldValue::UnsignedShort(v) => body.extend_from_slice(&v.to_be_bytes()),
                FieldValue::Identifier(s) => write_string(&mut body, s),
            }
        }
        let mut frame = Vec::with_capacity(body.len() + 5);
        write_varint(&mut frame, body.len() as i32);
        frame.extend(body);
        frame
    }
}

/// The first packet of a session: the client's declared target and next
/// action. The address is a routing hint from the client, not necessarily a
/// resolvable hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

/// What the client intends to do after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Status,
    Login,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Intent::Status => "STATUS",
            Intent::Login => "LOGIN",
        })
    }
}

impl Handshake {
    /// Refines a packet decoded with [`HANDSHAKE_SCHEMA`] into a handshake.
    /// Any tag other than 0x00 is a protocol violation, terminal for the
    /// session.
    pub fn classify(packet: &Packet) -> Result<Self, SessionError> {
        if packet.tag != HANDSHAKE_TAG {
            return Err(SessionError::Protocol { tag: packet.tag });
        }
        match packet.fields.as_slice() {
            [
                FieldValue::VarInt(protocol_version),
                FieldValue::Identifier(server_address),
                FieldValue::UnsignedShort(server_port),
                FieldValue::VarInt(next_state),
            ] => Ok(Handshake {
                protocol_version: *protocol_version,
                server_address: server_address.clone(),
                server_port: *server_port,
                next_state: *next_state,
            }),
            _ => Err(SessionError::Protocol { tag: packet.tag }),
        }
    }

    /// LOGIN iff next-state is 2; anything else is treated as a status query.
    pub fn intent(&self) -> Intent {
        if self.next_state == 2 {
            Intent::Login
        } else {
            Intent::Status
        }
    }

    pub fn to_packet(&self) -> Packet {
        Packet {
            tag: HANDSHAKE_TAG,
            fields: vec![
                FieldValue::VarInt(self.protocol_version),
                FieldValue::Identifier(self.server_address.clone()),
                FieldValue::UnsignedShort(self.server_port),
                FieldValue::VarInt(self.next_state),
            ],
        }
    }
}

/// JSON chat component carried by the disconnect packet.
#[derive(Serialize)]
struct ChatText<'a> {
    text: &'a str,
}

/// Sends a login disconnect with the given message, then waits out the grace
/// period so the client can surface it before the caller closes the socket.
/// The payload is a JSON chat component, `{"text": message}`.
pub async fn write_disconnect<S>(stream: &mut S, message: &str) -> Result<(), SessionError>
where
    S: AsyncWriteExt + Unpin,
{
    let reason = serde_json::to_string(&ChatText { text: message })
        .expect("chat component serialization cannot fail");
    let packet = Packet {
        tag: DISCONNECT_TAG,
        fields: vec![FieldValue::Identifier(reason)],
    };
    stream
        .write_all(&packet.encode())
        .await
        .map_err(SessionError::Write)?;
    tokio::time::sleep(KICK_GRACE).await;
    Ok(())
}

/// Reads a VarInt (max 5 bytes) from the stream.
async fn read_varint<R>(stream: &mut R) -> Result<i32, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let mut num_read = 0u32;
    let mut result = 0i32;
    loop {
        let byte = stream.read_u8().await?;
        result |= i32::from(byte & 0x7F) << (7 * num_read);
        num_read += 1;
        if (byte & 0x80) == 0 {
            return Ok(result);
        }
        if num_read >= VARINT_MAX_BYTES {
            return Err(FrameError::VarIntTooBig);
        }
    }
}

fn write_varint(buf: &mut Vec<u8>, mut value: i32) {
    loop {
        if (value & !0x7F) == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push(((value & 0x7F) | 0x80) as u8);
        value = ((value as u32) >> 7) as i32;
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

/// Cursor over a fully buffered frame body.
struct Body<'a> {
    buf: &'a [u8],
}

impl<'a> Body<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        if n > self.buf.len() {
            return Err(FrameError::Truncated);
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn varint(&mut self) -> Result<i32, FrameError> {
        let mut num_read = 0u32;
        let mut result = 0i32;
        loop {
            let byte = self.take(1)?[0];
            result |= i32::from(byte & 0x7F) << (7 * num_read);
            num_read += 1;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            if num_read >= VARINT_MAX_BYTES {
                return Err(FrameError::VarIntTooBig);
            }
        }
    }

    fn u16(&mut self) -> Result<u16, FrameError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn string(&mut self) -> Result<String, FrameError> {
        let declared = self.varint()?;
        let len = usize::try_from(declared).map_err(|_| FrameError::BadLength(declared))?;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::Oversize(len));
        }
        Ok(String::from_utf8(self.take(len)?.to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handshake() -> Handshake {
        Handshake {
            protocol_version: 758,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: 2,
        }
    }

    #[test]
    fn varint_known_encodings() {
        let cases: &[(i32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (255, &[0xff, 0x01]),
            (758, &[0xf6, 0x05]),
            (25565, &[0xdd, 0xc7, 0x01]),
            (-1, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            write_varint(&mut buf, *value);
            assert_eq!(buf, *expected, "encoding of {value}");
        }
    }

    #[tokio::test]
    async fn varint_round_trip() {
        for value in [0, 1, 127, 128, 300, 758, 25565, i32::MAX, -1, i32::MIN] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let mut stream = buf.as_slice();
            assert_eq!(read_varint(&mut stream).await.unwrap(), value);
            assert!(stream.is_empty());
        }
    }

    #[tokio::test]
    async fn varint_over_five_bytes_rejected() {
        let mut stream: &[u8] = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            read_varint(&mut stream).await,
            Err(FrameError::VarIntTooBig)
        ));
    }

    #[tokio::test]
    async fn handshake_round_trip() {
        let original = sample_handshake();
        let frame = original.to_packet().encode();
        let mut stream = frame.as_slice();
        let packet = Packet::read(&mut stream, HANDSHAKE_SCHEMA).await.unwrap();
        let decoded = Handshake::classify(&packet).unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn truncated_stream_fails() {
        let frame = sample_handshake().to_packet().encode();
        let mut stream = &frame[..frame.len() - 2];
        assert!(matches!(
            Packet::read(&mut stream, HANDSHAKE_SCHEMA).await,
            Err(FrameError::Io(_))
        ));
    }

    #[tokio::test]
    async fn short_body_fails() {
        // Declared length covers only the tag; the schema needs more.
        let mut stream: &[u8] = &[0x01, 0x00];
        assert!(matches!(
            Packet::read(&mut stream, HANDSHAKE_SCHEMA).await,
            Err(FrameError::Truncated)
        ));
    }

    #[tokio::test]
    async fn trailing_bytes_fail() {
        let frame = sample_handshake().to_packet().encode();
        // Re-frame the same body with one junk byte appended.
        let mut body = frame[1..].to_vec();
        body.push(0xAA);
        let mut reframed = Vec::new();
        write_varint(&mut reframed, body.len() as i32);
        reframed.extend(body);
        let mut stream = reframed.as_slice();
        assert!(matches!(
            Packet::read(&mut stream, HANDSHAKE_SCHEMA).await,
            Err(FrameError::TrailingBytes(1))
        ));
    }

    #[tokio::test]
    async fn oversize_frame_rejected() {
        let mut frame = Vec::new();
        write_varint(&mut frame, (MAX_FRAME_LEN + 1) as i32);
        let mut stream = frame.as_slice();
        assert!(matches!(
            Packet::read(&mut stream, HANDSHAKE_SCHEMA).await,
            Err(FrameError::Oversize(_))
        ));
    }

    #[tokio::test]
    async fn negative_frame_length_rejected() {
        let mut frame = Vec::new();
        write_varint(&mut frame, -1);
        let mut stream = frame.as_slice();
        assert!(matches!(
            Packet::read(&mut stream, HANDSHAKE_SCHEMA).await,
            Err(FrameError::BadLength(-1))
        ));
    }

    #[test]
    fn wrong_tag_is_protocol_error() {
        let mut packet = sample_handshake().to_packet();
        packet.tag = 0x01;
        assert!(matches!(
            Handshake::classify(&packet),
            Err(SessionError::Protocol { tag: 0x01 })
        ));
    }

    #[test]
    fn intent_classification() {
        let mut hs = sample_handshake();
        assert_eq!(hs.intent(), Intent::Login);
        for next_state in [0, 1, 3, -1] {
            hs.next_state = next_state;
            assert_eq!(hs.intent(), Intent::Status, "next_state {next_state}");
        }
    }

    #[tokio::test]
    async fn kick_frame_shape() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_disconnect(&mut server, "Failed to connect upstream")
            .await
            .unwrap();

        let packet = Packet::read(&mut client, &[FieldKind::Identifier])
            .await
            .unwrap();
        assert_eq!(packet.tag, DISCONNECT_TAG);
        let FieldValue::Identifier(reason) = &packet.fields[0] else {
            panic!("expected string field");
        };
        let value: serde_json::Value = serde_json::from_str(reason).unwrap();
        assert_eq!(value["text"], "Failed to connect upstream");
    }
}
