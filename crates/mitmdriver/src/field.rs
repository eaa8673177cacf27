//! Dynamic field addressing.
//!
//! Per the design notes: fields are a tagged variant interpreted at
//! evaluation time rather than runtime-dispatched string lookups, with a
//! single `get`/`set` pair implemented by pattern matching.

use crate::message::{header_append, header_get, header_remove, header_set, Message};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Method,
    Uri,
    Version,
    Header(String),
    Body,
    Status,
    Reason,
}

/// The value projected out of (or written into) a single field. A field's
/// shape is fixed by which variant it is: headers/method/uri/version/reason
/// are text, status is numeric, body is a byte buffer.
#[derive(Clone)]
pub enum Value {
    Text(String),
    Status(u16),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<u16> {
        match self {
            Value::Status(s) => Some(*s),
            _ => None,
        }
    }
}

/// Project `field` out of `message`. Returns `None` when the field does not
/// apply to this message's side (e.g. `Status` on a request) or the field
/// is an absent optional header.
pub fn get(field: &Field, message: &Message) -> Option<Value> {
    match (field, message) {
        (Field::Method, Message::Request(r)) => Some(Value::Text(r.method.clone())),
        (Field::Uri, Message::Request(r)) => Some(Value::Text(r.uri.clone())),
        (Field::Version, Message::Request(r)) => Some(Value::Text(r.version.clone())),
        (Field::Version, Message::Response(r)) => Some(Value::Text(r.version.clone())),
        (Field::Header(name), Message::Request(r)) => {
            header_get(&r.headers, name).map(|v| Value::Text(v.to_string()))
        }
        (Field::Header(name), Message::Response(r)) => {
            header_get(&r.headers, name).map(|v| Value::Text(v.to_string()))
        }
        (Field::Body, Message::Request(r)) => Some(Value::Bytes(r.body.clone())),
        (Field::Body, Message::Response(r)) => Some(Value::Bytes(r.body.clone())),
        (Field::Status, Message::Response(r)) => Some(Value::Status(r.status)),
        (Field::Reason, Message::Response(r)) => Some(Value::Text(r.reason.clone())),
        _ => None,
    }
}

/// Overwrite `field` on `message` with `value`, replacing any prior value.
/// Header writes preserve the existing entry's case if one is present.
pub fn set(field: &Field, message: &mut Message, value: Value) {
    match (field, message) {
        (Field::Method, Message::Request(r)) => {
            if let Some(v) = value.as_text() {
                r.method = v.to_string();
            }
        }
        (Field::Uri, Message::Request(r)) => {
            if let Some(v) = value.as_text() {
                r.uri = v.to_string();
            }
        }
        (Field::Version, Message::Request(r)) => {
            if let Some(v) = value.as_text() {
                r.version = v.to_string();
            }
        }
        (Field::Version, Message::Response(r)) => {
            if let Some(v) = value.as_text() {
                r.version = v.to_string();
            }
        }
        (Field::Header(name), Message::Request(r)) => {
            if let Some(v) = value.as_text() {
                header_set(&mut r.headers, name, v.to_string());
            }
        }
        (Field::Header(name), Message::Response(r)) => {
            if let Some(v) = value.as_text() {
                header_set(&mut r.headers, name, v.to_string());
            }
        }
        (Field::Body, Message::Request(r)) => {
            if let Some(v) = value.as_bytes() {
                r.body = v.to_vec();
            }
        }
        (Field::Body, Message::Response(r)) => {
            if let Some(v) = value.as_bytes() {
                r.body = v.to_vec();
            }
        }
        (Field::Status, Message::Response(r)) => {
            if let Some(v) = value.as_status() {
                r.status = v;
            }
        }
        (Field::Reason, Message::Response(r)) => {
            if let Some(v) = value.as_text() {
                r.reason = v.to_string();
            }
        }
        _ => {}
    }
}

/// Append semantics: repeatable fields (headers, body) grow; everything
/// else behaves like `set`.
pub fn append(field: &Field, message: &mut Message, value: Value) {
    match (field, message) {
        (Field::Header(name), Message::Request(r)) => {
            if let Some(v) = value.as_text() {
                header_append(&mut r.headers, name, v.to_string());
            }
        }
        (Field::Header(name), Message::Response(r)) => {
            if let Some(v) = value.as_text() {
                header_append(&mut r.headers, name, v.to_string());
            }
        }
        (Field::Body, Message::Request(r)) => {
            if let Some(v) = value.as_bytes() {
                r.body.extend_from_slice(v);
            }
        }
        (Field::Body, Message::Response(r)) => {
            if let Some(v) = value.as_bytes() {
                r.body.extend_from_slice(v);
            }
        }
        (field, message) => set(field, message, value),
    }
}

/// Delete semantics: only meaningful for headers; a no-op elsewhere.
pub fn remove(field: &Field, message: &mut Message) {
    match (field, message) {
        (Field::Header(name), Message::Request(r)) => header_remove(&mut r.headers, name),
        (Field::Header(name), Message::Response(r)) => header_remove(&mut r.headers, name),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RequestMessage;

    fn sample_request() -> Message {
        Message::Request(RequestMessage {
            method: "GET".into(),
            uri: "http://o/".into(),
            version: "HTTP/1.1".into(),
            headers: vec![("User-Agent".into(), "Mozilla".into())],
            body: vec![],
        })
    }

    #[test]
    fn header_get_is_case_insensitive() {
        let msg = sample_request();
        let v = get(&Field::Header("user-agent".into()), &msg).unwrap();
        assert_eq!(v.as_text(), Some("Mozilla"));
    }

    #[test]
    fn header_set_preserves_existing_case() {
        let mut msg = sample_request();
        set(
            &Field::Header("user-agent".into()),
            &mut msg,
            Value::Text("X".into()),
        );
        let Message::Request(r) = &msg else { unreachable!() };
        assert_eq!(r.headers, vec![("User-Agent".to_string(), "X".to_string())]);
    }

    #[test]
    fn header_append_creates_new_entry_with_given_case() {
        let mut msg = sample_request();
        append(
            &Field::Header("X-Trace".into()),
            &mut msg,
            Value::Text("1".into()),
        );
        let Message::Request(r) = &msg else { unreachable!() };
        assert_eq!(r.headers.last().unwrap().0, "X-Trace");
    }

    #[test]
    fn missing_header_returns_none() {
        let msg = sample_request();
        assert!(get(&Field::Header("Accept".into()), &msg).is_none());
    }

    #[test]
    fn status_field_not_applicable_to_request() {
        let msg = sample_request();
        assert!(get(&Field::Status, &msg).is_none());
    }
}
