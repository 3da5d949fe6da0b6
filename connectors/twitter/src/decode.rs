//! Decoding of stream messages into [`StreamEvent`]s.
//!
//! Decoding is total: every input yields exactly one event, with anything
//! unrecognized or malformed becoming [`StreamEvent::ParseError`].

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{
    DeletionNotice, DisconnectNotice, LimitNotice, ParseError, Status, StreamEvent, WarningNotice,
};

/// Decode a raw message.
#[must_use]
pub fn decode_slice(bytes: &[u8]) -> StreamEvent {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => decode(value),
        Err(e) => parse_error(format!("invalid JSON: {e}"), String::from_utf8_lossy(bytes)),
    }
}

/// Decode an already parsed message.
#[must_use]
pub fn decode(value: Value) -> StreamEvent {
    let Some(object) = value.as_object() else {
        return parse_error("message is not a JSON object", value.to_string());
    };

    // {"delete":{"status":{"id":..,"user_id":..}}}
    if let Some(delete) = object.get("delete") {
        return match delete.get("status") {
            Some(status) => notice::<DeletionNotice>(status, StreamEvent::Deletion, &value),
            None => parse_error("delete notice without status", value.to_string()),
        };
    }

    if let Some(limit) = object.get("limit") {
        return notice::<LimitNotice>(limit, StreamEvent::Limit, &value);
    }

    if let Some(warning) = object.get("warning") {
        return notice::<WarningNotice>(warning, StreamEvent::Warning, &value);
    }

    if let Some(disconnect) = object.get("disconnect") {
        return notice::<DisconnectNotice>(disconnect, StreamEvent::Disconnect, &value);
    }

    let has_text = object.contains_key("text") || object.contains_key("full_text");
    if object.contains_key("id") && has_text {
        return match Status::deserialize(&value) {
            Ok(status) => StreamEvent::Status(Box::new(status)),
            Err(e) => parse_error(format!("malformed status: {e}"), value.to_string()),
        };
    }

    parse_error("unrecognized message", value.to_string())
}

fn notice<T: DeserializeOwned>(
    body: &Value,
    wrap: impl FnOnce(T) -> StreamEvent,
    whole: &Value,
) -> StreamEvent {
    match T::deserialize(body) {
        Ok(notice) => wrap(notice),
        Err(e) => parse_error(format!("malformed notice: {e}"), whole.to_string()),
    }
}

fn parse_error(message: impl Into<String>, raw: impl Into<String>) -> StreamEvent {
    StreamEvent::ParseError(ParseError {
        message: message.into(),
        raw: raw.into(),
    })
}
