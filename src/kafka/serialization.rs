use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised while converting between typed values and record payloads
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid UTF-8 payload: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("record has no payload")]
    EmptyPayload,
}

/// Conversion between a typed value and its on-wire byte representation.
///
/// A `Serde` pair (one for keys, one for values) is supplied when the read
/// stream is created; every fetched record is decoded with it before being
/// handed to the registered handlers.
pub trait Serde<T> {
    /// Serialize a value to bytes
    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    /// Deserialize bytes into a value
    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializationError>;
}

/// JSON serializer backed by serde_json
///
/// # Examples
///
/// ```rust
/// use kafka_readstream::{JsonSerializer, Serde};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Serialize, Deserialize, Debug, PartialEq)]
/// struct Order { id: u64 }
///
/// let bytes = JsonSerializer.serialize(&Order { id: 7 }).unwrap();
/// let back: Order = JsonSerializer.deserialize(&bytes).unwrap();
/// assert_eq!(back, Order { id: 7 });
/// ```
#[derive(Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T> Serde<T> for JsonSerializer
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// String serializer converting to and from UTF-8 bytes
#[derive(Clone, Copy, Default)]
pub struct StringSerializer;

impl Serde<String> for StringSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>, SerializationError> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String, SerializationError> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

/// Pass-through serializer for raw byte payloads
#[derive(Clone, Copy, Default)]
pub struct BytesSerializer;

impl Serde<Vec<u8>> for BytesSerializer {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>, SerializationError> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>, SerializationError> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Payload {
            id: u32,
            name: String,
        }

        let value = Payload {
            id: 42,
            name: "test".to_string(),
        };
        let bytes = JsonSerializer.serialize(&value).unwrap();
        let back: Payload = JsonSerializer.deserialize(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_json_invalid_payload() {
        let result: Result<u32, _> = JsonSerializer.deserialize(b"not json");
        assert!(matches!(result, Err(SerializationError::Json(_))));
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let result = StringSerializer.deserialize(&[0xff, 0xfe]);
        assert!(matches!(result, Err(SerializationError::Utf8(_))));
    }

    #[test]
    fn test_bytes_pass_through() {
        let bytes = vec![1u8, 2, 3];
        assert_eq!(BytesSerializer.deserialize(&bytes).unwrap(), bytes);
    }
}
