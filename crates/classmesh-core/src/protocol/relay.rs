//! Relay lane binary frames (panic-free).
//!
//! Layout: `[v: u8 = 1][channel_len: u8][channel: utf-8][payload...]`.
//! The channel is a link direction id such as `L7/0`.
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` with `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MeshError, Result};

pub const RELAY_FRAME_VERSION: u8 = 1;

/// Parsed relay frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    pub channel: String,
    /// Opaque payload (zero-copy).
    pub payload: Bytes,
}

pub fn decode_relay_frame(mut buf: Bytes) -> Result<RelayFrame> {
    if buf.remaining() < 2 {
        return Err(MeshError::BadRequest("relay frame too short".into()));
    }

    let v = buf.get_u8();
    if v != RELAY_FRAME_VERSION {
        return Err(MeshError::UnsupportedVersion);
    }

    let len = usize::from(buf.get_u8());
    if len == 0 {
        return Err(MeshError::BadRequest("relay frame channel is empty".into()));
    }
    if buf.remaining() < len {
        return Err(MeshError::BadRequest("relay frame channel truncated".into()));
    }
    let channel = buf.copy_to_bytes(len);
    let channel = std::str::from_utf8(&channel)
        .map_err(|_| MeshError::BadRequest("relay frame channel is not utf-8".into()))?
        .to_string();

    let payload = buf.copy_to_bytes(buf.remaining());
    Ok(RelayFrame { channel, payload })
}

pub fn encode_relay_frame(channel: &str, payload: &[u8]) -> Result<Bytes> {
    let len = u8::try_from(channel.len())
        .map_err(|_| MeshError::BadRequest("relay channel longer than 255 bytes".into()))?;
    let mut out = BytesMut::with_capacity(2 + channel.len() + payload.len());
    out.put_u8(RELAY_FRAME_VERSION);
    out.put_u8(len);
    out.put_slice(channel.as_bytes());
    out.put_slice(payload);
    Ok(out.freeze())
}
