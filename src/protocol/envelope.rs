//! Envelope classification and serialization
//!
//! The server speaks JSON text frames. Each frame carries an `action` string
//! plus action-specific fields. A frame without a usable `action` is not a
//! protocol error; callers log and drop it, so `classify` returns `None`
//! rather than an error for that case.

use serde_json::{json, Map, Value};

use crate::types::Result;

/// Inbound message kinds, one variant per known action plus a catch-all.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Server assigned a session id to this connection
    Welcome { id: Option<String> },
    /// Subscription confirmed
    SubOk,
    /// Backlog count report for the subscribed channel
    Info { count: u64 },
    /// Delivered item batch
    Payload { count: u64, list: Vec<Value> },
    /// "New work may be available" push; carries no count
    Incoming,
    /// Routed packet delivery
    Packet(Value),
    /// Task assignment notification
    TaskAssign(Value),
    /// Anything with an action we do not recognize
    Unknown(Value),
}

/// Classify a parsed envelope by its `action` field.
///
/// Returns `None` when `action` is missing or empty. An `assign` envelope
/// carrying a truthy `packet` flag is delivered as a `Packet`, not a task
/// assignment.
pub fn classify(msg: &Value) -> Option<Inbound> {
    let action = msg.get("action").and_then(Value::as_str).unwrap_or("");
    if action.is_empty() {
        return None;
    }

    Some(match action {
        "welcome" => Inbound::Welcome {
            id: msg.get("id").and_then(Value::as_str).map(str::to_string),
        },
        "sub_ok" => Inbound::SubOk,
        "info" => Inbound::Info { count: data_count(msg) },
        "payload" => Inbound::Payload {
            count: data_count(msg),
            list: msg
                .pointer("/data/list")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        },
        "incoming" => Inbound::Incoming,
        "packet" => Inbound::Packet(msg.clone()),
        "assign" => {
            if msg.get("packet").and_then(Value::as_bool).unwrap_or(false) {
                Inbound::Packet(msg.clone())
            } else {
                Inbound::TaskAssign(msg.clone())
            }
        }
        _ => Inbound::Unknown(msg.clone()),
    })
}

fn data_count(msg: &Value) -> u64 {
    msg.pointer("/data/count").and_then(Value::as_u64).unwrap_or(0)
}

/// Outbound operations, serialized to JSON text frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Subscribe to a channel
    Sub { channel: String },
    /// Acknowledge an item by id
    Ack { id: String },
    /// Request the backlog count for a channel
    Info { channel: String },
    /// Request up to `count` items from a channel
    Get { channel: String, count: u32 },
    /// Forward a payload; `packet: true` flags it as a routed packet
    Route { payload: Value, packet: bool },
    /// Submit a task
    Task { payload: Value },
}

impl Outbound {
    /// Wire action string for this operation
    pub fn action(&self) -> &'static str {
        match self {
            Outbound::Sub { .. } => "sub",
            Outbound::Ack { .. } => "ack",
            Outbound::Info { .. } => "info",
            Outbound::Get { .. } => "get",
            Outbound::Route { .. } => "route",
            Outbound::Task { .. } => "task",
        }
    }

    /// Serialize to the JSON text frame the server expects
    pub fn encode(&self) -> Result<String> {
        let value = match self {
            Outbound::Sub { channel } => json!({ "action": "sub", "channel": channel }),
            Outbound::Ack { id } => json!({ "action": "ack", "id": id }),
            Outbound::Info { channel } => json!({ "channel": channel, "action": "info" }),
            Outbound::Get { channel, count } => json!({
                "data": { "count": count },
                "channel": channel,
                "action": "get",
            }),
            Outbound::Route { payload, packet } => merged(payload, "route", *packet),
            Outbound::Task { payload } => merged(payload, "task", false),
        };

        Ok(serde_json::to_string(&value)?)
    }
}

/// Merge the caller's payload with the action tag (and optional packet flag).
///
/// A non-object payload is nested under a `payload` key so the action tag
/// always lives at the top level of the envelope.
fn merged(payload: &Value, action: &str, packet: bool) -> Value {
    let mut map = match payload {
        Value::Object(m) => m.clone(),
        other => {
            let mut m = Map::new();
            m.insert("payload".to_string(), other.clone());
            m
        }
    };
    map.insert("action".to_string(), Value::String(action.to_string()));
    if packet {
        map.insert("packet".to_string(), Value::Bool(true));
    }
    Value::Object(map)
}
