//! Decode-once codec for the transport layer.
//!
//! - Text frames => Envelope (lazy `RawValue` for data)
//! - Binary frames => RelayFrame (panic-free bytes::Buf parsing)
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use bytes::Bytes;

use classmesh_core::{
    error::Result,
    protocol::{relay, text},
};

#[derive(Debug)]
pub enum Inbound {
    Text { env: text::Envelope, bytes_len: usize },
    Relay { frame: relay::RelayFrame, bytes_len: usize },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Frame size before any parsing.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) => v.len(),
        Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => {
            let bytes_len = s.len();
            let env = text::Envelope::parse(&s)?;
            Ok(Inbound::Text { env, bytes_len })
        }
        Message::Binary(b) => {
            let bytes_len = b.len();
            let frame = relay::decode_relay_frame(Bytes::from(b))?;
            Ok(Inbound::Relay { frame, bytes_len })
        }
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(v) => Ok(Inbound::Pong(v)),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
