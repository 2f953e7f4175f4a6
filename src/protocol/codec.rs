//! Frame encode/decode for the file-sharing protocol
//!
//! Encoding builds complete frames into a `BytesMut`. Decoding reads header
//! fields strictly in order through the byte-exact reader, so a receiver never
//! infers a size - it always reads the declared length exactly.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::AsyncRead;

use super::{Command, CMD_FIELD_LEN, MAX_PAYLOAD_SIZE, NAME_LEN_FIELD_LEN, PAYLOAD_LEN_FIELD_LEN};
use crate::transport::{read_exact_timeout, TransportError};

/// Codec errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unrecognized command byte: {0:#04x}")]
    UnknownCommand(u8),

    #[error("zero-length {0} field")]
    EmptyField(&'static str),

    #[error("name too long: {0} bytes (max 255)")]
    NameTooLong(usize),

    #[error("payload too large: {0} bytes (max {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(u64),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("name is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a bare command frame (LIST, BYE, SCAN, CONNECT).
pub fn encode_command(cmd: Command) -> BytesMut {
    let mut buf = BytesMut::with_capacity(CMD_FIELD_LEN);
    buf.put_u8(cmd.as_u8());
    buf
}

/// Encode a GET request: command + 1-byte name length + name.
pub fn encode_get_request(name: &str) -> ProtocolResult<BytesMut> {
    let mut buf = BytesMut::with_capacity(CMD_FIELD_LEN + NAME_LEN_FIELD_LEN + name.len());
    buf.put_u8(Command::Get.as_u8());
    put_name(&mut buf, name)?;
    Ok(buf)
}

/// Encode a PUT request: command + name fields + 8-byte length + payload.
pub fn encode_put_request(name: &str, payload: &[u8]) -> ProtocolResult<BytesMut> {
    let mut buf = BytesMut::with_capacity(
        CMD_FIELD_LEN + NAME_LEN_FIELD_LEN + name.len() + PAYLOAD_LEN_FIELD_LEN + payload.len(),
    );
    buf.put_u8(Command::Put.as_u8());
    put_name(&mut buf, name)?;
    buf.put_u64(payload.len() as u64);
    buf.put_slice(payload);
    Ok(buf)
}

/// Encode a response: 8-byte payload length + payload. Every server reply
/// uses this shape, the PUT acknowledgement included.
pub fn encode_response(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(PAYLOAD_LEN_FIELD_LEN + payload.len());
    buf.put_u64(payload.len() as u64);
    buf.put_slice(payload);
    buf
}

fn put_name(buf: &mut BytesMut, name: &str) -> ProtocolResult<()> {
    if name.is_empty() {
        return Err(ProtocolError::EmptyField("name"));
    }
    if name.len() > u8::MAX as usize {
        return Err(ProtocolError::NameTooLong(name.len()));
    }
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Read one command byte.
pub async fn read_command<R>(stream: &mut R, timeout: Duration) -> ProtocolResult<Command>
where
    R: AsyncRead + Unpin,
{
    let byte = read_exact_timeout(stream, CMD_FIELD_LEN, timeout).await?[0];
    Command::from_u8(byte).ok_or(ProtocolError::UnknownCommand(byte))
}

/// Read a 1-byte name length followed by the name. A zero length is a
/// protocol violation.
pub async fn read_name<R>(stream: &mut R, timeout: Duration) -> ProtocolResult<String>
where
    R: AsyncRead + Unpin,
{
    let len = read_exact_timeout(stream, NAME_LEN_FIELD_LEN, timeout).await?[0] as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyField("name length"));
    }
    let bytes = read_exact_timeout(stream, len, timeout).await?;
    Ok(String::from_utf8(bytes)?)
}

/// Read an 8-byte big-endian payload length followed by that many bytes.
pub async fn read_sized_payload<R>(stream: &mut R, timeout: Duration) -> ProtocolResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let field = read_exact_timeout(stream, PAYLOAD_LEN_FIELD_LEN, timeout).await?;
    let mut len_bytes = [0u8; PAYLOAD_LEN_FIELD_LEN];
    len_bytes.copy_from_slice(&field);
    let len = u64::from_be_bytes(len_bytes);

    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(len));
    }

    if len == 0 {
        return Ok(Vec::new());
    }
    Ok(read_exact_timeout(stream, len as usize, timeout).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn get_request_layout() {
        let frame = encode_get_request("hello.txt").unwrap();
        assert_eq!(frame[0], Command::Get.as_u8());
        assert_eq!(frame[1], 9);
        assert_eq!(&frame[2..], b"hello.txt");
    }

    #[test]
    fn put_request_layout() {
        let frame = encode_put_request("a.bin", b"xyz").unwrap();
        assert_eq!(frame[0], Command::Put.as_u8());
        assert_eq!(frame[1], 5);
        assert_eq!(&frame[2..7], b"a.bin");
        assert_eq!(u64::from_be_bytes(frame[7..15].try_into().unwrap()), 3);
        assert_eq!(&frame[15..], b"xyz");
    }

    #[test]
    fn empty_name_is_rejected_at_encode_time() {
        assert!(matches!(
            encode_get_request(""),
            Err(ProtocolError::EmptyField("name"))
        ));
    }

    #[tokio::test]
    async fn decode_reads_declared_lengths_exactly() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_put_request("f.txt", b"content").unwrap()[..]);
        // Trailing bytes the decoder must not consume.
        wire.extend_from_slice(b"LEFTOVER");

        let mut cursor = Cursor::new(wire);
        let cmd = read_command(&mut cursor, TIMEOUT).await.unwrap();
        assert_eq!(cmd, Command::Put);
        let name = read_name(&mut cursor, TIMEOUT).await.unwrap();
        assert_eq!(name, "f.txt");
        let payload = read_sized_payload(&mut cursor, TIMEOUT).await.unwrap();
        assert_eq!(payload, b"content");

        let rest = cursor.get_ref().len() as u64 - cursor.position();
        assert_eq!(rest, "LEFTOVER".len() as u64);
    }

    #[tokio::test]
    async fn zero_name_length_is_a_violation() {
        let mut cursor = Cursor::new(vec![0u8]);
        let err = read_name(&mut cursor, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyField(_)));
    }

    #[tokio::test]
    async fn oversized_payload_length_is_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        let mut cursor = Cursor::new(wire);
        let err = read_sized_payload(&mut cursor, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn unknown_command_byte_is_reported() {
        let mut cursor = Cursor::new(vec![4u8]);
        let err = read_command(&mut cursor, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(4)));
    }
}
