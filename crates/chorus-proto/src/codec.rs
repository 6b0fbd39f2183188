//! Envelope serialization.
//!
//! Envelopes are written as CBOR, a compact self-describing binary map
//! encoding. Decoding tries CBOR first and falls back to JSON only when the
//! binary decoder rejects the input, so peers that cannot produce CBOR can
//! still talk to every endpoint.

use crate::{CodecError, Envelope};

/// Serialization used for an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// CBOR (RFC 8949)
    Cbor,
    /// UTF-8 JSON text
    Json,
}

/// Encode an envelope as CBOR.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(envelope, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Encode an envelope as JSON.
pub fn encode_json(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(envelope).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode an envelope, reporting which encoding matched.
///
/// The whole input must be consumed: a CBOR item followed by garbage is
/// treated as a binary decode failure and handed to the JSON fallback.
pub fn decode_with_encoding(bytes: &[u8]) -> Result<(Envelope, Encoding), CodecError> {
    let binary = match decode_cbor(bytes) {
        Ok(envelope) => return Ok((envelope, Encoding::Cbor)),
        Err(reason) => reason,
    };

    match serde_json::from_slice::<Envelope>(bytes) {
        Ok(envelope) => Ok((envelope, Encoding::Json)),
        Err(e) => Err(CodecError::Undecodable { binary, json: e.to_string() }),
    }
}

/// Decode an envelope from CBOR or JSON.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    decode_with_encoding(bytes).map(|(envelope, _)| envelope)
}

fn decode_cbor(bytes: &[u8]) -> Result<Envelope, String> {
    let mut reader = bytes;
    let envelope: Envelope =
        ciborium::de::from_reader(&mut reader).map_err(|e| e.to_string())?;

    if reader.is_empty() {
        Ok(envelope)
    } else {
        Err(format!("{} trailing bytes", reader.len()))
    }
}
