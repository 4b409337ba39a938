//! Wire framing shared by client↔server traffic and consensus log payloads.
//!
//! Byte layout (little-endian, unaligned):
//! - Command frame: `cmd:u8 | body`.
//!   - `0x01` SET: `keyLen:i32 | key | valLen:i32 | val | ttl:i32` (ttl in ns; 0 = cache default).
//!   - `0x02` GET: `keyLen:i32 | key`.
//!   - `0x03` DEL: `keyLen:i32 | key`.
//!   - `0x04` JOIN: no body.
//! - SET response: `status:u8`.
//! - GET response: `status:u8 | valLen:i32 | val` (valLen = 0, no bytes, when status != OK).
//!
//! Every `decode_*` function here is incremental: called with whatever
//! bytes have arrived so far, it returns `Ok(None)` (not yet enough data,
//! leaving the buffer untouched) rather than blocking or erroring, so the
//! caller can keep reading off the socket and retry.

use bytes::{Buf, BufMut, BytesMut};
use kv_common::{Key, Ttl, Value, MAX_KEY_LEN, MAX_VALUE_LEN};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown command byte {0:#04x}")]
    UnknownCommand(u8),
    #[error("negative length field: {0}")]
    NegativeLength(i32),
    #[error("length {0} exceeds maximum {1}")]
    LengthTooLarge(i64, usize),
    #[error("invalid status byte {0:#04x}")]
    InvalidStatus(u8),
    #[error(transparent)]
    Key(#[from] kv_common::HkvError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: Key, value: Value, ttl: Ttl },
    Get { key: Key },
    Del { key: Key },
    Join,
}

impl Command {
    fn tag(&self) -> u8 {
        match self {
            Command::Set { .. } => 0x01,
            Command::Get { .. } => 0x02,
            Command::Del { .. } => 0x03,
            Command::Join => 0x04,
        }
    }
}

/// Response/FSM status codes. `0` is reserved and never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 1,
    Err = 2,
    NotFound = 3,
    Expired = 4,
}

impl Status {
    pub fn from_u8(b: u8) -> Result<Status, CodecError> {
        match b {
            1 => Ok(Status::Ok),
            2 => Ok(Status::Err),
            3 => Ok(Status::NotFound),
            4 => Ok(Status::Expired),
            other => Err(CodecError::InvalidStatus(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

pub fn encode_command(cmd: &Command, out: &mut BytesMut) {
    out.put_u8(cmd.tag());
    match cmd {
        Command::Set { key, value, ttl } => {
            put_len_prefixed(out, key.as_bytes());
            put_len_prefixed(out, value.as_bytes());
            out.put_i32_le(ttl.as_nanos() as i32);
        }
        Command::Get { key } | Command::Del { key } => {
            put_len_prefixed(out, key.as_bytes());
        }
        Command::Join => {}
    }
}

fn put_len_prefixed(out: &mut BytesMut, bytes: &[u8]) {
    out.put_i32_le(bytes.len() as i32);
    out.put_slice(bytes);
}

/// Reads one length-prefixed field from `data` starting at `pos`. Returns
/// `Ok(None)` if `data` does not yet contain the full field.
fn read_len_prefixed(
    data: &[u8],
    pos: &mut usize,
    max_len: usize,
) -> Result<Option<Vec<u8>>, CodecError> {
    if data.len() < *pos + 4 {
        return Ok(None);
    }
    let len_bytes: [u8; 4] = data[*pos..*pos + 4].try_into().unwrap();
    let len = i32::from_le_bytes(len_bytes);
    if len < 0 {
        return Err(CodecError::NegativeLength(len));
    }
    let len = len as usize;
    if len > max_len {
        return Err(CodecError::LengthTooLarge(len as i64, max_len));
    }
    if data.len() < *pos + 4 + len {
        return Ok(None);
    }
    let bytes = data[*pos + 4..*pos + 4 + len].to_vec();
    *pos += 4 + len;
    Ok(Some(bytes))
}

/// Parses one command frame out of `buf`. Leaves `buf` untouched and
/// returns `Ok(None)` if a complete frame has not yet arrived; otherwise
/// consumes exactly the frame's bytes.
pub fn decode_command(buf: &mut BytesMut) -> Result<Option<Command>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let data: &[u8] = &buf[..];
    let tag = data[0];
    let mut pos = 1usize;

    let result = match tag {
        0x01 => {
            let key = match read_len_prefixed(data, &mut pos, MAX_KEY_LEN)? {
                Some(k) => k,
                None => return Ok(None),
            };
            let value = match read_len_prefixed(data, &mut pos, MAX_VALUE_LEN)? {
                Some(v) => v,
                None => return Ok(None),
            };
            if data.len() < pos + 4 {
                return Ok(None);
            }
            let ttl_bytes: [u8; 4] = data[pos..pos + 4].try_into().unwrap();
            let ttl_raw = i32::from_le_bytes(ttl_bytes);
            pos += 4;
            let ttl = Ttl::from_nanos(ttl_raw.max(0) as u64);
            Command::Set {
                key: Key::new(key)?,
                value: Value::new(value)?,
                ttl,
            }
        }
        0x02 => {
            let key = match read_len_prefixed(data, &mut pos, MAX_KEY_LEN)? {
                Some(k) => k,
                None => return Ok(None),
            };
            Command::Get { key: Key::new(key)? }
        }
        0x03 => {
            let key = match read_len_prefixed(data, &mut pos, MAX_KEY_LEN)? {
                Some(k) => k,
                None => return Ok(None),
            };
            Command::Del { key: Key::new(key)? }
        }
        0x04 => Command::Join,
        other => return Err(CodecError::UnknownCommand(other)),
    };

    buf.advance(pos);
    Ok(Some(result))
}

pub fn encode_set_response(out: &mut BytesMut, status: Status) {
    out.put_u8(status.as_u8());
}

pub fn decode_set_response(buf: &mut BytesMut) -> Result<Option<Status>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let status = Status::from_u8(buf[0])?;
    buf.advance(1);
    Ok(Some(status))
}

pub fn encode_get_response(out: &mut BytesMut, status: Status, value: Option<&[u8]>) {
    out.put_u8(status.as_u8());
    match (status, value) {
        (Status::Ok, Some(v)) => {
            out.put_i32_le(v.len() as i32);
            out.put_slice(v);
        }
        _ => out.put_i32_le(0),
    }
}

pub fn decode_get_response(buf: &mut BytesMut) -> Result<Option<(Status, Vec<u8>)>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let data: &[u8] = &buf[..];
    let status = Status::from_u8(data[0])?;
    let mut pos = 1usize;
    let value = match read_len_prefixed(data, &mut pos, MAX_VALUE_LEN)? {
        Some(v) => v,
        None => return Ok(None),
    };
    buf.advance(pos);
    Ok(Some((status, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(cmd: Command) {
        let mut buf = BytesMut::new();
        encode_command(&cmd, &mut buf);
        let decoded = decode_command(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, cmd);
        assert!(buf.is_empty());
    }

    #[test]
    fn set_roundtrips() {
        roundtrip(Command::Set {
            key: Key::new(b"foo".to_vec()).unwrap(),
            value: Value::new(b"bar".to_vec()).unwrap(),
            ttl: Ttl::from_nanos(1_000_000),
        });
    }

    #[test]
    fn get_and_del_roundtrip() {
        roundtrip(Command::Get { key: Key::new(b"k".to_vec()).unwrap() });
        roundtrip(Command::Del { key: Key::new(b"k".to_vec()).unwrap() });
    }

    #[test]
    fn join_roundtrips() {
        roundtrip(Command::Join);
    }

    #[test]
    fn partial_frame_returns_none_without_consuming() {
        let mut buf = BytesMut::new();
        encode_command(
            &Command::Get { key: Key::new(b"partial".to_vec()).unwrap() },
            &mut buf,
        );
        let mut truncated = BytesMut::from(&buf[..buf.len() - 2]);
        assert_eq!(decode_command(&mut truncated).unwrap(), None);
        assert_eq!(truncated.len(), buf.len() - 2);
    }

    #[test]
    fn unknown_command_byte_errors() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xff);
        assert!(matches!(
            decode_command(&mut buf),
            Err(CodecError::UnknownCommand(0xff))
        ));
    }

    #[test]
    fn oversized_length_errors() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x02);
        buf.put_i32_le((MAX_KEY_LEN as i32) + 1);
        assert!(matches!(
            decode_command(&mut buf),
            Err(CodecError::LengthTooLarge(_, _))
        ));
    }

    #[test]
    fn negative_length_errors() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x02);
        buf.put_i32_le(-1);
        assert!(matches!(
            decode_command(&mut buf),
            Err(CodecError::NegativeLength(-1))
        ));
    }

    #[test]
    fn get_response_roundtrips() {
        let mut buf = BytesMut::new();
        encode_get_response(&mut buf, Status::Ok, Some(b"value"));
        let (status, value) = decode_get_response(&mut buf).unwrap().unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(value, b"value");
    }

    #[test]
    fn get_response_not_found_has_empty_value() {
        let mut buf = BytesMut::new();
        encode_get_response(&mut buf, Status::NotFound, None);
        let (status, value) = decode_get_response(&mut buf).unwrap().unwrap();
        assert_eq!(status, Status::NotFound);
        assert!(value.is_empty());
    }
}
