//! Length-prefixed packet framing used by the Java-edition status protocol.

use crate::ProbeError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound for one inbound packet. Status responses with a favicon are
/// typically well under 100 KiB.
pub const MAX_PACKET_LEN: usize = 4 * 1024 * 1024;

/// Protocol version announced in the handshake.
pub const HANDSHAKE_PROTOCOL: i32 = 47;

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            buf.push(v as u8);
            return;
        }
        buf.push(((v & 0x7F) as u8) | 0x80);
        v >>= 7;
    }
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

/// Wrap `id` + `body` into a length-prefixed frame.
pub fn frame(id: i32, body: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(body.len() + 5);
    write_varint(&mut inner, id);
    inner.extend_from_slice(body);
    let mut out = Vec::with_capacity(inner.len() + 5);
    write_varint(&mut out, inner.len() as i32);
    out.extend_from_slice(&inner);
    out
}

pub fn handshake(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::new();
    write_varint(&mut body, HANDSHAKE_PROTOCOL);
    write_string(&mut body, host);
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, 1); // next state: status
    frame(0x00, &body)
}

pub fn status_request() -> Vec<u8> {
    frame(0x00, &[])
}

pub async fn read_varint<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = r.read_u8().await?;
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("varint longer than 5 bytes".into()))
}

/// Decode a VarInt from the front of `buf`, returning it and the bytes consumed.
pub fn decode_varint(buf: &[u8]) -> Result<(i32, usize), ProbeError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().take(5).enumerate() {
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value as i32, i + 1));
        }
    }
    if buf.len() < 5 {
        Err(ProbeError::Protocol("truncated varint".into()))
    } else {
        Err(ProbeError::Protocol("varint longer than 5 bytes".into()))
    }
}

/// Read one frame and return `(packet id, body)`.
pub async fn read_packet<R: AsyncRead + Unpin>(r: &mut R) -> Result<(i32, Vec<u8>), ProbeError> {
    let len = read_varint(r).await?;
    if len <= 0 {
        return Err(ProbeError::Protocol(format!("invalid packet length {len}")));
    }
    let len = len as usize;
    if len > MAX_PACKET_LEN {
        return Err(ProbeError::Protocol(format!("packet of {len} bytes exceeds limit")));
    }
    let mut data = vec![0u8; len];
    r.read_exact(&mut data).await?;
    let (id, used) = decode_varint(&data)?;
    data.drain(..used);
    Ok((id, data))
}

/// Decode a length-prefixed UTF-8 string that spans the rest of `body`.
pub fn decode_string(body: &[u8]) -> Result<String, ProbeError> {
    let (len, used) = decode_varint(body)?;
    if len < 0 {
        return Err(ProbeError::Protocol(format!("negative string length {len}")));
    }
    let rest = &body[used..];
    let len = len as usize;
    if rest.len() < len {
        return Err(ProbeError::Protocol(format!("string of {len} bytes truncated to {}", rest.len())));
    }
    String::from_utf8(rest[..len].to_vec()).map_err(|e| ProbeError::Protocol(format!("invalid utf-8: {e}")))
}
