//! Encoding of named route arguments inside URL path segments.

use crate::error::BoxError;

use serde_json::Value;

/// A bidirectional string encoding for structured values.
///
/// The router decodes every argument segment of a named route path with the
/// codec; clients must encode with the same codec.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, BoxError>;
    fn decode(&self, raw: &str) -> Result<Value, BoxError>;
}

/// Encodes values as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String, BoxError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, raw: &str) -> Result<Value, BoxError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec() {
        let value = json!({ "from": "2026-01-01", "ids": [1, 2] });
        let encoded = JsonCodec.encode(&value).unwrap();
        assert_eq!(JsonCodec.decode(&encoded).unwrap(), value);
        assert_eq!(JsonCodec.decode("42").unwrap(), json!(42));
        assert!(JsonCodec.decode("{not json").is_err());
    }
}
