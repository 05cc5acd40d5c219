//! Value serialization
//!
//! The registry shares one serializer between all clients. The trait works
//! on `serde_json::Value` so it stays object safe; typed encoding happens in
//! the database view.

use crate::error::SerializationError;

pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>, SerializationError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, SerializationError>;

    /// Short name used in diagnostics
    fn name(&self) -> &'static str;
}

/// Compact JSON encoding
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value).map_err(SerializationError::Serialize)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, SerializationError> {
        serde_json::from_slice(bytes).map_err(SerializationError::Deserialize)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
