//! Canonical payload encoding.
//!
//! A payload is a single text line:
//!
//! ```text
//! pubsub_chat|v1|<type>|<k1>=<v1>|<k2>=<v2>|...
//! ```
//!
//! Fields are sorted by key and every value is percent-encoded with the
//! `encodeURIComponent` character set, so the delimiter `|` and the
//! separator `=` never appear inside a value. The same field set always
//! produces the same string regardless of insertion order; signatures
//! and proof-of-work are computed over this exact string.
//!
//! Keys and the type tag are written verbatim and must not contain `|`
//! or `=`. All keys used by the protocol are fixed lowercase words.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use pubchat_types::{PubchatError, Result};

/// Protocol name, the first segment of every payload.
pub const PROTOCOL_NAME: &str = "pubsub_chat";

/// Protocol version, the second segment of every payload.
pub const PROTOCOL_VERSION: &str = "v1";

/// Segment delimiter.
pub const DELIMITER: char = '|';

/// Minimum number of `|`-separated segments in a valid payload.
const MIN_SEGMENTS: usize = 4;

/// Characters left unescaped: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// Well-known field keys.

/// Topic the frame was published to.
pub const FIELD_ROOM: &str = "room";
/// Sender-claimed timestamp in ms.
pub const FIELD_TS: &str = "ts";
/// Sender-claimed address.
pub const FIELD_ADDR: &str = "addr";
/// Sender nickname.
pub const FIELD_NICK: &str = "nick";
/// Mined proof-of-work nonce.
pub const FIELD_NONCE: &str = "nonce";
/// Message body for `msg` frames.
pub const FIELD_TEXT: &str = "text";

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A decoded payload: type tag plus a sorted field map.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Payload {
    kind: String,
    fields: BTreeMap<String, String>,
}

impl Payload {
    /// Creates an empty payload with the given type tag.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Inserts or replaces a field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// The type tag, as found in the payload. May be unknown.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Looks up a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// All fields in key order.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Renders the canonical string.
    pub fn encode(&self) -> String {
        encode_payload(&self.kind, &self.fields)
    }
}

// ---------------------------------------------------------------------------
// Encoding / decoding
// ---------------------------------------------------------------------------

/// Encodes `kind` and `fields` into the canonical payload string.
///
/// The result always ends with the type tag followed by `|`, even when
/// `fields` is empty, so it always splits into at least four segments.
pub fn encode_payload(kind: &str, fields: &BTreeMap<String, String>) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, URI_COMPONENT)))
        .collect();
    format!(
        "{PROTOCOL_NAME}{DELIMITER}{PROTOCOL_VERSION}{DELIMITER}{kind}{DELIMITER}{}",
        parts.join("|")
    )
}

/// Decodes a canonical payload string.
///
/// Segments without `=`, or with `=` as their first character, are
/// skipped. When a key repeats, the last occurrence wins.
///
/// # Errors
///
/// Returns [`PubchatError::InvalidPayload`] when the prefix or version
/// does not match, when there are fewer than four segments, or when a
/// value carries a malformed percent escape or invalid UTF-8.
pub fn decode_payload(input: &str) -> Result<Payload> {
    let segments: Vec<&str> = input.split(DELIMITER).collect();
    if segments.len() < MIN_SEGMENTS {
        return Err(PubchatError::InvalidPayload {
            reason: format!("expected at least {MIN_SEGMENTS} segments, got {}", segments.len()),
        });
    }
    if segments[0] != PROTOCOL_NAME || segments[1] != PROTOCOL_VERSION {
        return Err(PubchatError::InvalidPayload {
            reason: "unexpected protocol prefix".into(),
        });
    }

    let mut payload = Payload::new(segments[2]);
    for segment in &segments[3..] {
        let Some(idx) = segment.find('=') else {
            continue;
        };
        if idx == 0 {
            continue;
        }
        let key = &segment[..idx];
        let raw = &segment[idx + 1..];
        payload.set(key, decode_component(raw)?);
    }
    Ok(payload)
}

fn decode_component(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !well_formed {
                return Err(PubchatError::InvalidPayload {
                    reason: "malformed percent escape".into(),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .map(|cow| cow.into_owned())
        .map_err(|e| PubchatError::InvalidPayload {
            reason: format!("field is not valid utf-8: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
