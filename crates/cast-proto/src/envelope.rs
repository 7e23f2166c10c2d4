//! Length-prefixed tagged envelope codec.
//!
//! Frame layout: `[body length: u32 BE][body]`. The body is a sequence of
//! fields, each introduced by a varint tag `(field_number << 3) | wire_type`.
//! Strings are `[tag][varint length][UTF-8 bytes]`, integers are
//! `[tag][varint]`.
//!
//! Field numbers:
//! - 1: protocol version (varint, always 0)
//! - 2: source id
//! - 3: destination id
//! - 4: namespace
//! - 5: payload type (varint, 0 = UTF-8 string)
//! - 6: UTF-8 payload

use cast_core::CodecError;

use crate::namespace::Namespace;

/// Size of the big-endian length prefix in front of every frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Protocol version tag (CASTV2_1_0).
pub const PROTOCOL_VERSION: u64 = 0;

/// Payload type tag for UTF-8 string payloads.
pub const PAYLOAD_TYPE_STRING: u64 = 0;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LENGTH_DELIMITED: u8 = 2;
const WIRE_FIXED32: u8 = 5;

const FIELD_PROTOCOL_VERSION: u64 = 1;
const FIELD_SOURCE_ID: u64 = 2;
const FIELD_DESTINATION_ID: u64 = 3;
const FIELD_NAMESPACE: u64 = 4;
const FIELD_PAYLOAD_TYPE: u64 = 5;
const FIELD_PAYLOAD_UTF8: u64 = 6;

/// Varints longer than this cannot represent a u64.
const MAX_VARINT_LEN: usize = 10;

/// One framed control-channel message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlEnvelope {
    pub source_id: String,
    pub destination_id: String,
    /// Namespace URN. Kept as a string so unknown namespaces survive decoding.
    pub namespace: String,
    /// UTF-8 payload, a JSON document understood by the namespace handler.
    pub payload: String,
}

impl ControlEnvelope {
    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: Namespace,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.as_urn().to_string(),
            payload: payload.into(),
        }
    }

    /// The namespace, if it is one of the known sub-protocols.
    pub fn namespace_kind(&self) -> Option<Namespace> {
        Namespace::from_urn(&self.namespace)
    }

    /// Encode to a length-prefixed frame.
    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }
}

/// Encode an envelope to a length-prefixed frame.
pub fn encode(envelope: &ControlEnvelope) -> Vec<u8> {
    let body = encode_body(envelope);
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Encode the envelope fields without the length prefix.
pub fn encode_body(envelope: &ControlEnvelope) -> Vec<u8> {
    let mut body = Vec::with_capacity(
        16 + envelope.source_id.len()
            + envelope.destination_id.len()
            + envelope.namespace.len()
            + envelope.payload.len(),
    );
    put_varint_field(&mut body, FIELD_PROTOCOL_VERSION, PROTOCOL_VERSION);
    put_string_field(&mut body, FIELD_SOURCE_ID, &envelope.source_id);
    put_string_field(&mut body, FIELD_DESTINATION_ID, &envelope.destination_id);
    put_string_field(&mut body, FIELD_NAMESPACE, &envelope.namespace);
    put_varint_field(&mut body, FIELD_PAYLOAD_TYPE, PAYLOAD_TYPE_STRING);
    put_string_field(&mut body, FIELD_PAYLOAD_UTF8, &envelope.payload);
    body
}

/// Decode a length-prefixed frame.
///
/// The prefix must match the body length exactly.
pub fn decode(frame: &[u8]) -> Result<ControlEnvelope, CodecError> {
    if frame.len() < LENGTH_PREFIX_LEN {
        return Err(CodecError::MalformedEnvelope(format!(
            "frame of {} bytes is shorter than the length prefix",
            frame.len()
        )));
    }
    let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let body = &frame[LENGTH_PREFIX_LEN..];
    if declared != body.len() {
        return Err(CodecError::MalformedEnvelope(format!(
            "length prefix declares {} bytes, frame carries {}",
            declared,
            body.len()
        )));
    }
    decode_body(body)
}

/// Decode an envelope body (no length prefix).
///
/// Unknown fields are skipped according to their wire type.
pub fn decode_body(body: &[u8]) -> Result<ControlEnvelope, CodecError> {
    let mut reader = FieldReader::new(body);
    let mut envelope = ControlEnvelope::default();

    while !reader.is_empty() {
        let tag = reader.read_varint()?;
        let field = tag >> 3;
        let wire_type = (tag & 0x7) as u8;

        match (field, wire_type) {
            (FIELD_SOURCE_ID, WIRE_LENGTH_DELIMITED) => {
                envelope.source_id = reader.read_string(field)?;
            }
            (FIELD_DESTINATION_ID, WIRE_LENGTH_DELIMITED) => {
                envelope.destination_id = reader.read_string(field)?;
            }
            (FIELD_NAMESPACE, WIRE_LENGTH_DELIMITED) => {
                envelope.namespace = reader.read_string(field)?;
            }
            (FIELD_PAYLOAD_UTF8, WIRE_LENGTH_DELIMITED) => {
                envelope.payload = reader.read_string(field)?;
            }
            (_, WIRE_VARINT) => {
                // protocol version, payload type, or an unknown integer field
                reader.read_varint()?;
            }
            (_, WIRE_LENGTH_DELIMITED) => {
                reader.read_length_delimited(field)?;
            }
            (_, WIRE_FIXED64) => {
                reader.read_exact(8, field)?;
            }
            (_, WIRE_FIXED32) => {
                reader.read_exact(4, field)?;
            }
            (_, other) => {
                return Err(CodecError::MalformedEnvelope(format!(
                    "unsupported wire type {} for field {}",
                    other, field
                )));
            }
        }
    }

    Ok(envelope)
}

fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn put_varint_field(buf: &mut Vec<u8>, field: u64, value: u64) {
    put_varint(buf, (field << 3) | WIRE_VARINT as u64);
    put_varint(buf, value);
}

fn put_string_field(buf: &mut Vec<u8>, field: u64, value: &str) {
    put_varint(buf, (field << 3) | WIRE_LENGTH_DELIMITED as u64);
    put_varint(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}

/// Bounds-checked cursor over an envelope body.
struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_varint(&mut self) -> Result<u64, CodecError> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self.data.get(self.pos).ok_or_else(|| {
                CodecError::MalformedEnvelope(format!("truncated varint at offset {}", self.pos))
            })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::MalformedEnvelope(format!(
            "varint longer than {} bytes ending at offset {}",
            MAX_VARINT_LEN, self.pos
        )))
    }

    fn read_exact(&mut self, len: usize, field: u64) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::MalformedEnvelope(format!(
                "field {} declares {} bytes but only {} remain",
                field,
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_length_delimited(&mut self, field: u64) -> Result<&'a [u8], CodecError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| {
            CodecError::MalformedEnvelope(format!("field {} length {} overflows", field, len))
        })?;
        self.read_exact(len, field)
    }

    fn read_string(&mut self, field: u64) -> Result<String, CodecError> {
        let bytes = self.read_length_delimited(field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            CodecError::MalformedEnvelope(format!("field {} is not valid UTF-8", field))
        })
    }
}
