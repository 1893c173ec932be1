//! CBOR codec for the engine boundary.
//!
//! Requests, responses and notifications cross into the engine as
//! self-describing CBOR blobs. Structured values are `serde_json::Value`; the
//! mapping is:
//!
//! | JSON            | CBOR                                   |
//! |-----------------|----------------------------------------|
//! | null            | null                                   |
//! | bool            | bool                                   |
//! | integer number  | unsigned / negative int                |
//! | other number    | float64                                |
//! | string          | text string                            |
//! | array           | definite-length array                  |
//! | object          | definite-length map, keys sorted       |
//!
//! Byte strings, tags, undefined and indefinite-length items are rejected on
//! decode.

use std::convert::Infallible;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use serde_json::Value;
use thiserror::Error;

use super::method::Method;
use super::wire::{LiveAction, Notification, PendingCall};

/// Maximum nesting of arrays/maps accepted on encode and decode.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cbor encode: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error("cbor decode: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("indefinite-length CBOR not allowed")]
    IndefiniteLength,
    #[error("value nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("trailing bytes after value")]
    TrailingBytes,
}

// ============================================================================
// Public entry points
// ============================================================================

/// Encode `{id, method, params}` for submission to the engine.
pub fn encode_request(call: &PendingCall) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    enc.map(3)?;
    enc.str("id")?;
    enc.u64(call.id)?;
    enc.str("method")?;
    enc.str(call.method.as_str())?;
    enc.str("params")?;
    enc.array(call.params.len() as u64)?;
    for param in &call.params {
        encode_json_value(&mut enc, param, 2)?;
    }
    Ok(buf)
}

/// Decode a request blob. Used on the engine side of the boundary.
pub fn decode_request(bytes: &[u8]) -> Result<PendingCall, CodecError> {
    let mut dec = Decoder::new(bytes);
    let map_len = decode_map_len(&mut dec, 0)?;

    let mut id = None;
    let mut method = None;
    let mut params = Vec::new();

    for _ in 0..map_len {
        let key = dec.str()?;
        match key {
            "id" => id = Some(decode_u64(&mut dec, "id")?),
            "method" => method = Some(Method::parse(dec.str()?)),
            "params" => match decode_json_value(&mut dec, 1, "params")? {
                Value::Array(items) => params = items,
                Value::Null => params = Vec::new(),
                other => {
                    return Err(CodecError::InvalidField {
                        field: "params",
                        reason: format!("expected array, got {other}"),
                    })
                }
            },
            _ => dec.skip()?,
        }
    }
    ensure_consumed(&dec, bytes)?;

    Ok(PendingCall {
        id: id.ok_or(CodecError::MissingField("id"))?,
        method: method.ok_or(CodecError::MissingField("method"))?,
        params,
    })
}

/// Encode a single structured value (a response payload).
pub fn encode_value(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    encode_json_value(&mut enc, value, 0)?;
    Ok(buf)
}

/// Decode a single structured value; the blob must contain exactly one item.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut dec = Decoder::new(bytes);
    let value = decode_json_value(&mut dec, 0, "value")?;
    ensure_consumed(&dec, bytes)?;
    Ok(value)
}

/// Encode one notification stream item as `{id, action, result}`.
pub fn encode_notification(notification: &Notification) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    let len = 1 + u64::from(notification.id.is_some()) + u64::from(notification.action.is_some());
    enc.map(len)?;
    if let Some(id) = &notification.id {
        enc.str("id")?;
        enc.str(id)?;
    }
    if let Some(action) = &notification.action {
        enc.str("action")?;
        enc.str(action.as_str())?;
    }
    enc.str("result")?;
    encode_json_value(&mut enc, &notification.result, 1)?;
    Ok(buf)
}

/// Decode one notification stream item.
///
/// `id` may be text or an integer (integers are stringified); a missing
/// `result` decodes as null.
pub fn decode_notification(bytes: &[u8]) -> Result<Notification, CodecError> {
    let mut dec = Decoder::new(bytes);
    let map_len = decode_map_len(&mut dec, 0)?;

    let mut id = None;
    let mut action = None;
    let mut result = Value::Null;

    for _ in 0..map_len {
        let key = dec.str()?;
        match key {
            "id" => {
                id = match dec.datatype()? {
                    Type::String => Some(dec.str()?.to_string()),
                    Type::U8 | Type::U16 | Type::U32 | Type::U64 => Some(dec.u64()?.to_string()),
                    Type::I8 | Type::I16 | Type::I32 | Type::I64 => Some(dec.i64()?.to_string()),
                    Type::Null => {
                        dec.null()?;
                        None
                    }
                    other => {
                        return Err(CodecError::InvalidField {
                            field: "id",
                            reason: format!("unsupported type {other}"),
                        })
                    }
                };
            }
            "action" => action = Some(LiveAction::parse(dec.str()?)),
            "result" => result = decode_json_value(&mut dec, 1, "result")?,
            _ => dec.skip()?,
        }
    }
    ensure_consumed(&dec, bytes)?;

    Ok(Notification { id, action, result })
}

// ============================================================================
// JSON value mapping
// ============================================================================

// Depth numbering matches `decode_json_value` so both sides accept the same set.
fn encode_json_value(
    enc: &mut Encoder<&mut Vec<u8>>,
    value: &Value,
    depth: usize,
) -> Result<(), CodecError> {
    ensure_depth(depth)?;
    match value {
        Value::Null => {
            enc.null()?;
        }
        Value::Bool(val) => {
            enc.bool(*val)?;
        }
        Value::Number(num) => {
            if let Some(n) = num.as_u64() {
                enc.u64(n)?;
            } else if let Some(n) = num.as_i64() {
                enc.i64(n)?;
            } else if let Some(n) = num.as_f64() {
                enc.f64(n)?;
            }
        }
        Value::String(s) => {
            enc.str(s)?;
        }
        Value::Array(items) => {
            enc.array(items.len() as u64)?;
            for item in items {
                encode_json_value(enc, item, depth + 1)?;
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            enc.map(keys.len() as u64)?;
            for key in keys {
                enc.str(key)?;
                encode_json_value(enc, &map[key], depth + 1)?;
            }
        }
    }
    Ok(())
}

fn decode_json_value(
    dec: &mut Decoder,
    depth: usize,
    field: &'static str,
) -> Result<Value, CodecError> {
    ensure_depth(depth)?;
    match dec.datatype()? {
        Type::Null => {
            dec.null()?;
            Ok(Value::Null)
        }
        Type::Bool => Ok(Value::Bool(dec.bool()?)),
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Ok(Value::Number(dec.u64()?.into())),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 => Ok(Value::Number(dec.i64()?.into())),
        Type::Int => Err(CodecError::InvalidField {
            field,
            reason: "integer out of range".into(),
        }),
        Type::F16 | Type::F32 | Type::F64 => {
            let value = dec.f64()?;
            let num = serde_json::Number::from_f64(value).ok_or_else(|| {
                CodecError::InvalidField {
                    field,
                    reason: "float is not finite".into(),
                }
            })?;
            Ok(Value::Number(num))
        }
        Type::String => Ok(Value::String(dec.str()?.to_string())),
        Type::Array => {
            let len = decode_array_len(dec, depth)?;
            let mut out = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                out.push(decode_json_value(dec, depth + 1, field)?);
            }
            Ok(Value::Array(out))
        }
        Type::Map => {
            let len = decode_map_len(dec, depth)?;
            let mut out = serde_json::Map::new();
            for _ in 0..len {
                let key = dec.str()?.to_string();
                let value = decode_json_value(dec, depth + 1, field)?;
                out.insert(key, value);
            }
            Ok(Value::Object(out))
        }
        Type::BytesIndef | Type::StringIndef | Type::ArrayIndef | Type::MapIndef => {
            Err(CodecError::IndefiniteLength)
        }
        Type::Bytes => Err(CodecError::InvalidField {
            field,
            reason: "byte strings are not supported".into(),
        }),
        Type::Tag => Err(CodecError::InvalidField {
            field,
            reason: "tags are not supported".into(),
        }),
        other => Err(CodecError::InvalidField {
            field,
            reason: format!("unsupported CBOR type {other}"),
        }),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn ensure_depth(depth: usize) -> Result<(), CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }
    Ok(())
}

fn ensure_consumed(dec: &Decoder, bytes: &[u8]) -> Result<(), CodecError> {
    if dec.position() < bytes.len() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(())
}

fn decode_map_len(dec: &mut Decoder, depth: usize) -> Result<usize, CodecError> {
    ensure_depth(depth)?;
    let Some(len) = dec.map()? else {
        return Err(CodecError::IndefiniteLength);
    };
    usize::try_from(len).map_err(|_| CodecError::InvalidField {
        field: "map",
        reason: "length overflows usize".into(),
    })
}

fn decode_array_len(dec: &mut Decoder, depth: usize) -> Result<usize, CodecError> {
    ensure_depth(depth)?;
    let Some(len) = dec.array()? else {
        return Err(CodecError::IndefiniteLength);
    };
    usize::try_from(len).map_err(|_| CodecError::InvalidField {
        field: "array",
        reason: "length overflows usize".into(),
    })
}

fn decode_u64(dec: &mut Decoder, field: &'static str) -> Result<u64, CodecError> {
    match dec.datatype()? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Ok(dec.u64()?),
        other => Err(CodecError::InvalidField {
            field,
            reason: format!("expected unsigned integer, got {other}"),
        }),
    }
}
