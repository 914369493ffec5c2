// file: src/codec.rs
// description: Engine.IO v4 / Socket.IO v5 text packet encoding for the realtime channel
// reference: https://socket.io/docs/v4/socket-io-protocol/

use crate::error::DashboardError;
use serde_json::Value;

/// Client request to join the default namespace.
pub const NAMESPACE_CONNECT: &str = "40";
/// Client notice that it is leaving the default namespace.
pub const NAMESPACE_DISCONNECT: &str = "41";
/// Reply to a server heartbeat.
pub const PONG: &str = "3";

/// Engine.IO transport-level packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Value),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, payload: Value },
    Ack,
    ConnectError(String),
}

pub fn decode(text: &str) -> Result<Packet, DashboardError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| DashboardError::InvalidPacket("empty packet".to_string()))?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(parse_json_or_null(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(rest).map(Packet::Message),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(DashboardError::InvalidPacket(format!(
            "unknown engine packet type '{other}'"
        ))),
    }
}

fn decode_socket(text: &str) -> Result<SocketPacket, DashboardError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| DashboardError::InvalidPacket("empty socket packet".to_string()))?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => {
            let value = parse_json_or_null(body)?;
            Ok(SocketPacket::Connect((!value.is_null()).then_some(value)))
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(body),
        '3' | '6' => Ok(SocketPacket::Ack),
        '4' => Ok(SocketPacket::ConnectError(connect_error_message(
            parse_json_or_null(body)?,
        ))),
        '5' => Err(DashboardError::InvalidPacket(
            "binary events are not supported".to_string(),
        )),
        other => Err(DashboardError::InvalidPacket(format!(
            "unknown socket packet type '{other}'"
        ))),
    }
}

fn decode_event(body: &str) -> Result<SocketPacket, DashboardError> {
    let args: Vec<Value> = serde_json::from_str(body)?;
    let mut args = args.into_iter();

    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(DashboardError::InvalidPacket(
                "event packet without a name".to_string(),
            ));
        }
    };

    Ok(SocketPacket::Event {
        name,
        payload: args.next().unwrap_or(Value::Null),
    })
}

/// Encodes an event for the default namespace: `42["name",payload]`.
pub fn encode_event(name: &str, payload: &Value) -> Result<String, DashboardError> {
    let args = serde_json::to_string(&[Value::String(name.to_string()), payload.clone()])?;
    Ok(format!("42{args}"))
}

// "/admin,{...}" -> "{...}"; the root namespace carries no prefix.
fn strip_namespace(text: &str) -> &str {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => &text[idx + 1..],
            None => "",
        }
    } else {
        text
    }
}

fn strip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_json_or_null(text: &str) -> Result<Value, DashboardError> {
    if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        Ok(serde_json::from_str(text)?)
    }
}

fn connect_error_message(value: Value) -> String {
    match value {
        Value::String(message) => message,
        Value::Object(ref map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Value::Null => "connection rejected".to_string(),
        other => other.to_string(),
    }
}
