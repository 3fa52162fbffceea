use crate::Value;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode value payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("malformed typed string {0:?}")]
    TypedString(String),
}

/// ValueCodec turns a single value into the opaque byte payload stored in a
/// bundle column, and back. Implementations must be stable within one
/// process; payloads never outlive the bundle that carries them.
pub trait ValueCodec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, data: &[u8]) -> Result<Value, CodecError>;
}

/// The default codec: the tagged JSON rendering of [`Value`].
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(data).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Record;

    #[test]
    fn round_trip() {
        let codec = JsonCodec;
        let values = vec![
            Value::Str("abc".to_string()),
            Value::I32(-7),
            Value::I64(1 << 40),
            Value::F64(2.5),
            Value::Bool(true),
            Value::List(vec![Value::I32(1), Value::I32(2)]),
            Value::map_of(vec![(Value::str("k"), Value::I32(3))]),
            Value::Record(Record::new("T").set("A", Value::str("v"))),
        ];
        for value in values {
            let data = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&data).unwrap(), value);
        }
    }
}
