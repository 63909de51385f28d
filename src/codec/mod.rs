//! Body encoding.
//!
//! A message body travels as raw bytes unless its declared content type is
//! [`MSGPACK_CONTENT_TYPE`]. In that case the body is read as a JSON document
//! and re-serialised as MessagePack before it goes on the wire.

use serde_json::Value;

use crate::utils::Result;

/// Content type that selects the MessagePack re-encoding path.
pub const MSGPACK_CONTENT_TYPE: &str = "application/x-msgpack";

pub fn is_msgpack(content_type: Option<&str>) -> bool {
    content_type == Some(MSGPACK_CONTENT_TYPE)
}

/// Translates an application body into wire bytes for `content_type`.
pub fn encode_body(content_type: Option<&str>, body: &[u8]) -> Result<Vec<u8>> {
    if !is_msgpack(content_type) {
        return Ok(body.to_vec());
    }

    let document: Value = serde_json::from_slice(body)?;
    // Named serialisation keeps JSON objects as string-keyed maps.
    Ok(rmp_serde::to_vec_named(&document)?)
}

/// Reads wire bytes back into a structured document.
///
/// MessagePack bodies are decoded; anything else must already be JSON.
pub fn decode_document(content_type: Option<&str>, bytes: &[u8]) -> Result<Value> {
    if is_msgpack(content_type) {
        Ok(rmp_serde::from_slice(bytes)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}
