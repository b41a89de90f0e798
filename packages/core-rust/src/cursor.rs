//! Opaque cursor codecs.
//!
//! A cursor is the sort key of one row, serialized to bytes and then to
//! URL-safe base64 without padding. Two shapes exist:
//!
//! - [`ScalarCursor`]: a single `i64` identifier as 8 big-endian bytes.
//! - [`TimestampAndBytesCursor`]: a version byte followed by a `MsgPack`
//!   encoding of a tagged payload enum, so new composite shapes can be added
//!   as new variants without reinterpreting old tokens.
//!
//! Decoding fails closed: any malformed, truncated, padded, mistagged or
//! wrong-shape input is an error, never a zero-valued key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CursorError;
use crate::sort_key::SortKey;
use crate::types::{Value, ValueKind};

/// Version byte prefixed to every composite cursor payload.
pub const COMPOSITE_CURSOR_VERSION: u8 = 1;

const SCALAR_LEN: usize = 8;

fn to_text(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn from_text(token: &str) -> Result<Vec<u8>, CursorError> {
    let raw = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| CursorError::Base64(e.to_string()))?;
    if raw.is_empty() {
        return Err(CursorError::Empty);
    }
    Ok(raw)
}

/// Cursor over a single integer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarCursor(pub i64);

impl ScalarCursor {
    #[must_use]
    pub fn encode(&self) -> String {
        to_text(&self.0.to_be_bytes())
    }

    /// # Errors
    ///
    /// Returns [`CursorError`] unless `token` is exactly 8 base64-encoded bytes.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let raw = from_text(token)?;
        let bytes: [u8; SCALAR_LEN] =
            raw.as_slice()
                .try_into()
                .map_err(|_| CursorError::Length {
                    expected: SCALAR_LEN,
                    found: raw.len(),
                })?;
        Ok(Self(i64::from_be_bytes(bytes)))
    }
}

/// Cursor over a `(timestamp, bytes)` pair, e.g. `(set_at, grant_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampAndBytesCursor {
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

/// Tagged payload carried after the version byte.
#[derive(Debug, Serialize, Deserialize)]
enum CompositePayload {
    TimestampAndBytes(TimestampAndBytesCursor),
}

impl TimestampAndBytesCursor {
    /// # Errors
    ///
    /// Returns [`CursorError::Payload`] if `MsgPack` serialization fails.
    pub fn encode(&self) -> Result<String, CursorError> {
        let payload = CompositePayload::TimestampAndBytes(self.clone());
        let body =
            rmp_serde::to_vec(&payload).map_err(|e| CursorError::Payload(e.to_string()))?;
        let mut raw = Vec::with_capacity(body.len() + 1);
        raw.push(COMPOSITE_CURSOR_VERSION);
        raw.extend_from_slice(&body);
        Ok(to_text(&raw))
    }

    /// # Errors
    ///
    /// Returns [`CursorError`] on bad base64, an unknown version, a payload that
    /// does not deserialize, or trailing bytes after the payload.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let raw = from_text(token)?;
        let (version, mut body) = match raw.split_first() {
            Some((v, rest)) => (*v, rest),
            None => return Err(CursorError::Empty),
        };
        if version != COMPOSITE_CURSOR_VERSION {
            return Err(CursorError::Version(version));
        }
        let payload: CompositePayload = rmp_serde::from_read(&mut body)
            .map_err(|e| CursorError::Payload(e.to_string()))?;
        if !body.is_empty() {
            return Err(CursorError::TrailingBytes(body.len()));
        }
        match payload {
            CompositePayload::TimestampAndBytes(cursor) => Ok(cursor),
        }
    }
}

/// The cursor codec a sort key descriptor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShape {
    /// One `Int` field.
    Scalar,
    /// One `Timestamp` field followed by one `Bytes` field.
    TimestampAndBytes,
}

impl CursorShape {
    /// Kinds of the key fields, in order.
    #[must_use]
    pub fn kinds(self) -> &'static [ValueKind] {
        match self {
            Self::Scalar => &[ValueKind::Int],
            Self::TimestampAndBytes => &[ValueKind::Timestamp, ValueKind::Bytes],
        }
    }

    fn check(self, values: &[Value]) -> Result<(), CursorError> {
        let kinds = self.kinds();
        if values.len() != kinds.len() {
            return Err(CursorError::Arity {
                expected: kinds.len(),
                found: values.len(),
            });
        }
        for (index, (value, expected)) in values.iter().zip(kinds).enumerate() {
            if value.kind() != *expected {
                return Err(CursorError::FieldKind {
                    index,
                    expected: *expected,
                    found: value.kind(),
                });
            }
        }
        Ok(())
    }

    /// Encodes a sort key of this shape.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if `key` does not have this shape.
    pub fn encode(self, key: &SortKey) -> Result<String, CursorError> {
        let values = key.values();
        self.check(values)?;
        match (self, values) {
            (Self::Scalar, [Value::Int(id)]) => Ok(ScalarCursor(*id).encode()),
            (Self::TimestampAndBytes, [Value::Timestamp(ts), Value::Bytes(bytes)]) => {
                TimestampAndBytesCursor {
                    timestamp: *ts,
                    bytes: bytes.clone(),
                }
                .encode()
            }
            // check() above guarantees one of the arms matched
            _ => Err(CursorError::Arity {
                expected: self.kinds().len(),
                found: values.len(),
            }),
        }
    }

    /// Decodes a token into a sort key of this shape.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the token is malformed or encodes another shape.
    pub fn decode(self, token: &str) -> Result<SortKey, CursorError> {
        let values = match self {
            Self::Scalar => vec![Value::Int(ScalarCursor::decode(token)?.0)],
            Self::TimestampAndBytes => {
                let c = TimestampAndBytesCursor::decode(token)?;
                vec![Value::Timestamp(c.timestamp), Value::Bytes(c.bytes)]
            }
        };
        Ok(SortKey::new(values))
    }
}
