//! Source RCON packet framing.
//!
//! Layout: `i32` length of the rest, `i32` request id, `i32` type, payload,
//! two NUL terminators. All integers little-endian.

use crate::error::ChannelError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

pub(crate) const TYPE_LOGIN: i32 = 3;
pub(crate) const TYPE_COMMAND: i32 = 2;
pub(crate) const TYPE_RESPONSE: i32 = 0;

/// Largest command payload a Minecraft server accepts.
pub(crate) const MAX_COMMAND_LEN: usize = 1446;
/// Largest single reply payload a Minecraft server sends.
pub(crate) const MAX_REPLY_LEN: usize = 4096;

/// request id + type + two terminators
const HEADER_AND_PADDING: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Packet {
    pub request_id: i32,
    pub kind: i32,
    pub payload: String,
}

pub(crate) fn encode(request_id: i32, kind: i32, payload: &str) -> Bytes {
    let body_len = payload.len() + HEADER_AND_PADDING;
    let mut buf = BytesMut::with_capacity(4 + body_len);
    buf.put_i32_le(body_len as i32);
    buf.put_i32_le(request_id);
    buf.put_i32_le(kind);
    buf.put_slice(payload.as_bytes());
    buf.put_u8(0);
    buf.put_u8(0);
    buf.freeze()
}

/// Read exactly one packet. EOF before a full packet surfaces as an I/O error.
pub(crate) async fn read_packet<R>(reader: &mut R) -> Result<Packet, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_i32_le().await?;
    if len < HEADER_AND_PADDING as i32 || len as usize > MAX_REPLY_LEN + HEADER_AND_PADDING {
        return Err(ChannelError::Protocol(format!("invalid packet length {len}")));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let mut body = Bytes::from(body);
    let request_id = body.get_i32_le();
    let kind = body.get_i32_le();

    // Payload is everything up to the first terminator.
    let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
    let payload = String::from_utf8_lossy(&body[..end]).into_owned();

    Ok(Packet {
        request_id,
        kind,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encoded_packet_reads_back() {
        let bytes = encode(7, TYPE_COMMAND, "replay stop chunks named run1");
        assert_eq!(&bytes[..4], &(39i32).to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 2..], &[0, 0]);

        let mut reader = &bytes[..];
        let packet = read_packet(&mut reader).await.unwrap();
        assert_eq!(packet.request_id, 7);
        assert_eq!(packet.kind, TYPE_COMMAND);
        assert_eq!(packet.payload, "replay stop chunks named run1");
    }

    #[tokio::test]
    async fn oversized_length_is_a_protocol_error() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(1_000_000i32).to_le_bytes());
        let mut reader = &raw[..];
        let err = read_packet(&mut reader).await.unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn truncated_packet_is_an_io_error() {
        let bytes = encode(1, TYPE_RESPONSE, "hello");
        let mut reader = &bytes[..bytes.len() - 3];
        let err = read_packet(&mut reader).await.unwrap_err();
        assert!(matches!(err, ChannelError::Io(_)));
    }
}
