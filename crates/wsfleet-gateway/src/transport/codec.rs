//! Decode-once codec for the transport layer.
//!
//! - Text frames => `ClientFrame` (lazy `RawValue` for data)
//! - Binary frames => a `message` event with an opaque payload
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use bytes::Bytes;
use wsfleet_core::{error::Result, protocol::event};

#[derive(Debug)]
pub enum Inbound {
    Event(event::ClientFrame),
    Binary(Bytes),
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => Ok(Inbound::Event(event::decode_client_frame(&s)?)),
        Message::Binary(b) => Ok(Inbound::Binary(Bytes::from(b))),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
